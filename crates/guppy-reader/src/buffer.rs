//! Caller-owned output buffers
//!
//! A read writes into a slice the caller already allocated with one entry
//! per particle. The slice's element type selects the output conversion;
//! its shape must fit the expression being read.

use std::fmt;

use guppy_formats::convert::{decode_each, fill_sequence};
use guppy_formats::{
    ColumnAccess, ColumnSource, Element, Endian, RockstarParticle, ScalarType, convert_strided,
};

use crate::{ReaderError, Result};

/// Layout an expression needs from its output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferShape {
    /// One value per particle
    Flat,
    /// One triplet per particle
    Vector,
    /// One [`RockstarParticle`] per particle
    Rockstar,
}

impl fmt::Display for BufferShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flat => "[T]",
            Self::Vector => "[[T; 3]]",
            Self::Rockstar => "[RockstarParticle]",
        })
    }
}

/// A mutable view of the caller's output storage
#[derive(Debug)]
pub enum OutputBuffer<'a> {
    /// `u32` values
    U32(&'a mut [u32]),
    /// `u64` values
    U64(&'a mut [u64]),
    /// `f32` values
    F32(&'a mut [f32]),
    /// `f64` values
    F64(&'a mut [f64]),
    /// `f32` triplets
    Vec32(&'a mut [[f32; 3]]),
    /// `f64` triplets
    Vec64(&'a mut [[f64; 3]]),
    /// Rockstar particle records
    Rockstar(&'a mut [RockstarParticle]),
}

macro_rules! impl_from_slice {
    ($ty:ty, $variant:ident) => {
        impl<'a> From<&'a mut [$ty]> for OutputBuffer<'a> {
            fn from(slice: &'a mut [$ty]) -> Self {
                Self::$variant(slice)
            }
        }

        impl<'a> From<&'a mut Vec<$ty>> for OutputBuffer<'a> {
            fn from(vec: &'a mut Vec<$ty>) -> Self {
                Self::$variant(vec.as_mut_slice())
            }
        }
    };
}

impl_from_slice!(u32, U32);
impl_from_slice!(u64, U64);
impl_from_slice!(f32, F32);
impl_from_slice!(f64, F64);
impl_from_slice!([f32; 3], Vec32);
impl_from_slice!([f64; 3], Vec64);
impl_from_slice!(RockstarParticle, Rockstar);

fn fill_flat<T: Element>(
    out: &mut [T],
    access: &ColumnAccess,
    raw: &[u8],
    endian: Endian,
) -> Result<()> {
    match access.source {
        ColumnSource::ImplicitId { start } => fill_sequence(start, out),
        ColumnSource::Stored { .. } => convert_strided(
            raw,
            access.scalar,
            endian,
            access.width,
            access.component.unwrap_or(0),
            out,
        )?,
    }
    Ok(())
}

fn fill_vector<T: Element>(
    out: &mut [[T; 3]],
    access: &ColumnAccess,
    raw: &[u8],
    endian: Endian,
) -> Result<()> {
    match access.source {
        ColumnSource::Stored { .. } => {
            convert_strided(raw, access.scalar, endian, 1, 0, out.as_flattened_mut())?;
            Ok(())
        }
        ColumnSource::ImplicitId { .. } => Err(ReaderError::BufferShape {
            expression: "id".to_string(),
            expected: BufferShape::Flat,
            actual: BufferShape::Vector,
        }),
    }
}

impl OutputBuffer<'_> {
    /// Number of particles the buffer holds
    pub fn len(&self) -> usize {
        match self {
            Self::U32(b) => b.len(),
            Self::U64(b) => b.len(),
            Self::F32(b) => b.len(),
            Self::F64(b) => b.len(),
            Self::Vec32(b) => b.len(),
            Self::Vec64(b) => b.len(),
            Self::Rockstar(b) => b.len(),
        }
    }

    /// True if the buffer has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Layout of the buffer
    pub const fn shape(&self) -> BufferShape {
        match self {
            Self::U32(_) | Self::U64(_) | Self::F32(_) | Self::F64(_) => BufferShape::Flat,
            Self::Vec32(_) | Self::Vec64(_) => BufferShape::Vector,
            Self::Rockstar(_) => BufferShape::Rockstar,
        }
    }

    /// Element type written into the buffer, if it has a single one
    pub const fn element_type(&self) -> Option<ScalarType> {
        match self {
            Self::U32(_) => Some(ScalarType::U32),
            Self::U64(_) => Some(ScalarType::U64),
            Self::F32(_) | Self::Vec32(_) => Some(ScalarType::F32),
            Self::F64(_) | Self::Vec64(_) => Some(ScalarType::F64),
            Self::Rockstar(_) => None,
        }
    }

    /// Check that the buffer fits an expression reading `n` particles
    pub fn check(&self, expression: &str, expected: BufferShape, n: usize) -> Result<()> {
        if self.shape() != expected {
            return Err(ReaderError::BufferShape {
                expression: expression.to_string(),
                expected,
                actual: self.shape(),
            });
        }
        if self.len() != n {
            return Err(ReaderError::BufferSize {
                expression: expression.to_string(),
                expected: n,
                actual: self.len(),
            });
        }
        Ok(())
    }

    /// Write one access's values into the buffer.
    ///
    /// `field` is the position of `access` in its plan; composite records
    /// use it to pick the record field (`x[0..3]`, `v[0..3]`, then `id`).
    pub(crate) fn fill(
        &mut self,
        field: usize,
        access: &ColumnAccess,
        raw: &[u8],
        endian: Endian,
    ) -> Result<()> {
        match self {
            Self::U32(out) => fill_flat(out, access, raw, endian),
            Self::U64(out) => fill_flat(out, access, raw, endian),
            Self::F32(out) => fill_flat(out, access, raw, endian),
            Self::F64(out) => fill_flat(out, access, raw, endian),
            Self::Vec32(out) => fill_vector(out, access, raw, endian),
            Self::Vec64(out) => fill_vector(out, access, raw, endian),
            Self::Rockstar(out) => fill_rockstar(out, field, access, raw, endian),
        }
    }
}

fn fill_rockstar(
    out: &mut [RockstarParticle],
    field: usize,
    access: &ColumnAccess,
    raw: &[u8],
    endian: Endian,
) -> Result<()> {
    let count = out.len();
    let component = access.component.unwrap_or(0);

    match (field, access.source) {
        (_, ColumnSource::ImplicitId { start }) => {
            let mut ids = vec![0u64; count];
            fill_sequence(start, &mut ids);
            for (particle, id) in out.iter_mut().zip(ids) {
                particle.id = id;
            }
        }
        (0..=2, ColumnSource::Stored { .. }) => {
            decode_each(
                raw,
                access.scalar,
                endian,
                access.width,
                component,
                count,
                |i, value: f32| {
                    out[i].x[field] = value;
                },
            )?;
        }
        (3..=5, ColumnSource::Stored { .. }) => {
            decode_each(
                raw,
                access.scalar,
                endian,
                access.width,
                component,
                count,
                |i, value: f32| {
                    out[i].v[field - 3] = value;
                },
            )?;
        }
        (_, ColumnSource::Stored { .. }) => {
            decode_each(
                raw,
                access.scalar,
                endian,
                access.width,
                component,
                count,
                |i, value: u64| {
                    out[i].id = value;
                },
            )?;
        }
    }
    Ok(())
}
