//! Element type tags and conversion between on-disk and caller element types
//!
//! Every column is stored as one of four element types. Callers may request
//! any of the four as output; conversions use Rust's `as` semantics, so
//! float-to-integer narrowing truncates toward zero and saturates at the
//! integer bounds (NaN becomes zero), `u64` to `u32` keeps the low 32 bits,
//! and integer-to-float rounds to the nearest representable value.
#![allow(clippy::cast_precision_loss)] // Conversions are lossy by contract
#![allow(clippy::cast_lossless, clippy::unnecessary_cast)] // Uniform `as` in macro impls

use std::fmt;
use std::str::FromStr;

use binrw::Endian;

use crate::error::{FormatError, FormatResult};

/// On-disk element type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 32-bit IEEE float
    F32,
    /// 64-bit IEEE float
    F64,
}

impl ScalarType {
    /// All supported element types
    pub const ALL: [Self; 4] = [Self::U32, Self::U64, Self::F32, Self::F64];

    /// Parse a three-character type tag
    pub fn from_tag(tag: &str) -> FormatResult<Self> {
        match tag {
            "u32" => Ok(Self::U32),
            "u64" => Ok(Self::U64),
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            other => Err(FormatError::UnknownTypeTag(other.to_string())),
        }
    }

    /// Parse a type tag as stored in the variable table
    pub fn from_tag_bytes(tag: [u8; 3]) -> FormatResult<Self> {
        match &tag {
            b"u32" => Ok(Self::U32),
            b"u64" => Ok(Self::U64),
            b"f32" => Ok(Self::F32),
            b"f64" => Ok(Self::F64),
            _ => Err(FormatError::UnknownTypeTag(
                String::from_utf8_lossy(&tag).into_owned(),
            )),
        }
    }

    /// The type tag string
    pub const fn tag(self) -> &'static str {
        match self {
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Element width in bytes
    pub const fn size(self) -> usize {
        match self {
            Self::U32 | Self::F32 => 4,
            Self::U64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ScalarType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

/// A caller-side element type that any stored element can be converted into
pub trait Element: Copy + Default + Send + Sync + 'static {
    /// The matching on-disk tag
    const SCALAR: ScalarType;

    /// Convert from a stored `u32`
    fn from_u32(value: u32) -> Self;
    /// Convert from a stored `u64`
    fn from_u64(value: u64) -> Self;
    /// Convert from a stored `f32`
    fn from_f32(value: f32) -> Self;
    /// Convert from a stored `f64`
    fn from_f64(value: f64) -> Self;

    /// Append the encoded element to `out`
    fn encode(self, endian: Endian, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($ty:ty, $scalar:expr) => {
        impl Element for $ty {
            const SCALAR: ScalarType = $scalar;

            #[inline]
            fn from_u32(value: u32) -> Self {
                value as $ty
            }

            #[inline]
            fn from_u64(value: u64) -> Self {
                value as $ty
            }

            #[inline]
            fn from_f32(value: f32) -> Self {
                value as $ty
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn encode(self, endian: Endian, out: &mut Vec<u8>) {
                match endian {
                    Endian::Big => out.extend_from_slice(&self.to_be_bytes()),
                    Endian::Little => out.extend_from_slice(&self.to_le_bytes()),
                }
            }
        }
    };
}

impl_element!(u32, ScalarType::U32);
impl_element!(u64, ScalarType::U64);
impl_element!(f32, ScalarType::F32);
impl_element!(f64, ScalarType::F64);

fn bytes4(chunk: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(chunk);
    out
}

fn bytes8(chunk: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(chunk);
    out
}

fn decode_u32(chunk: &[u8], endian: Endian) -> u32 {
    match endian {
        Endian::Big => u32::from_be_bytes(bytes4(chunk)),
        Endian::Little => u32::from_le_bytes(bytes4(chunk)),
    }
}

fn decode_u64(chunk: &[u8], endian: Endian) -> u64 {
    match endian {
        Endian::Big => u64::from_be_bytes(bytes8(chunk)),
        Endian::Little => u64::from_le_bytes(bytes8(chunk)),
    }
}

fn decode_f32(chunk: &[u8], endian: Endian) -> f32 {
    f32::from_bits(decode_u32(chunk, endian))
}

fn decode_f64(chunk: &[u8], endian: Endian) -> f64 {
    f64::from_bits(decode_u64(chunk, endian))
}

/// Decode `count` elements of `raw` and hand each converted value to `sink`.
///
/// Output element `i` is stored element `i * stride + component`, so a
/// vector column with interleaved triplets is read with `stride = 3`.
pub fn decode_each<T, F>(
    raw: &[u8],
    source: ScalarType,
    endian: Endian,
    stride: usize,
    component: usize,
    count: usize,
    mut sink: F,
) -> FormatResult<()>
where
    T: Element,
    F: FnMut(usize, T),
{
    if count == 0 {
        return Ok(());
    }

    let stride = stride.max(1);
    let size = source.size();
    let needed = ((count - 1) * stride + component + 1) * size;
    if needed > raw.len() {
        return Err(FormatError::Truncated {
            expected: needed as u64,
            actual: raw.len() as u64,
        });
    }

    let chunks = raw
        .chunks_exact(size)
        .skip(component)
        .step_by(stride)
        .take(count)
        .enumerate();

    match source {
        ScalarType::U32 => {
            for (i, chunk) in chunks {
                sink(i, T::from_u32(decode_u32(chunk, endian)));
            }
        }
        ScalarType::U64 => {
            for (i, chunk) in chunks {
                sink(i, T::from_u64(decode_u64(chunk, endian)));
            }
        }
        ScalarType::F32 => {
            for (i, chunk) in chunks {
                sink(i, T::from_f32(decode_f32(chunk, endian)));
            }
        }
        ScalarType::F64 => {
            for (i, chunk) in chunks {
                sink(i, T::from_f64(decode_f64(chunk, endian)));
            }
        }
    }

    Ok(())
}

/// Convert stored elements into `out`, one output element per selected
/// stored element.
pub fn convert_strided<T: Element>(
    raw: &[u8],
    source: ScalarType,
    endian: Endian,
    stride: usize,
    component: usize,
    out: &mut [T],
) -> FormatResult<()> {
    let count = out.len();
    decode_each(raw, source, endian, stride, component, count, |i, value| {
        out[i] = value;
    })
}

/// Fill `out` with the consecutive sequence `start, start + 1, ...`
/// converted to `T`. Used for identifiers that are implied rather than stored.
pub fn fill_sequence<T: Element>(start: u64, out: &mut [T]) {
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = T::from_u64(start.wrapping_add(i as u64));
    }
}

fn convert_to<T: Element>(raw: &[u8], source: ScalarType, endian: Endian) -> FormatResult<Vec<u8>> {
    let count = raw.len() / source.size();
    let mut values = vec![T::default(); count];
    convert_strided(raw, source, endian, 1, 0, &mut values)?;

    let mut out = Vec::with_capacity(count * T::SCALAR.size());
    for value in values {
        value.encode(endian, &mut out);
    }
    Ok(out)
}

/// Convert a packed run of `source` elements into packed `dest` elements.
///
/// Both input and output use `endian`. Trailing bytes that do not form a
/// whole element are ignored. Identical types are copied through unchanged.
pub fn convert(
    raw: &[u8],
    source: ScalarType,
    dest: ScalarType,
    endian: Endian,
) -> FormatResult<Vec<u8>> {
    if source == dest {
        let whole = raw.len() - raw.len() % source.size();
        return Ok(raw[..whole].to_vec());
    }

    match dest {
        ScalarType::U32 => convert_to::<u32>(raw, source, endian),
        ScalarType::U64 => convert_to::<u64>(raw, source, endian),
        ScalarType::F32 => convert_to::<f32>(raw, source, endian),
        ScalarType::F64 => convert_to::<f64>(raw, source, endian),
    }
}
