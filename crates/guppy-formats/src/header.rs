//! Guppy file header and column layout
//!
//! Every file starts with a magic number and a version. The version selects
//! the fixed-width preamble decoder; both versions are followed by the same
//! variable table, and column data begins right after it.
//!
//! Layout (byte order chosen by the writer, detected from the magic):
//! ```text
//! u32 magic                         0xBADF00D0
//! u32 version                       1 or 2
//! preamble                          PreambleV1 (96 bytes) or PreambleV2 (152 bytes)
//! u32 original_header_len
//! [u8; original_header_len]         native header of the source simulation
//! u32 n_vars
//! [u32; n_vars]                     name lengths
//! name bytes, concatenated
//! [[u8; 3]; n_vars]                 type tags ("u32", "u64", "f32", "f64")
//! [u8; n_vars]                      components per particle (version 2 only)
//! column data, in table order
//! ```
//!
//! A column holds `n * width` elements. Vector columns (width 3) store each
//! particle's triplet contiguously.

use std::collections::HashSet;
use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::{BinRead, BinWrite, Endian};
use tracing::{debug, warn};

use crate::convert::ScalarType;
use crate::error::{FormatError, FormatResult};

/// Magic number at the start of every Guppy file
pub const MAGIC: u32 = 0xBADF_00D0;

/// The magic number as seen when reading a big-endian file little-endian
pub const REVERSE_MAGIC: u32 = MAGIC.swap_bytes();

/// Newest header version this reader understands
pub const CURRENT_VERSION: u32 = 2;

/// Bytes taken by the magic number and version
pub const IDENT_SIZE: u64 = 8;

/// Names that version 1 files treat as three-component vectors
pub const LEGACY_VECTOR_NAMES: [&str; 2] = ["x", "v"];

/// Fixed-width preamble of version 1 files
#[derive(Debug, Clone, PartialEq, BinRead, BinWrite)]
pub struct PreambleV1 {
    /// Particles in this file
    pub n: i64,
    /// Particles in the full simulation
    pub n_tot: i64,
    /// Slab dimensions
    pub span: [i64; 3],
    /// ID of the first particle in the file
    pub id_offset: u64,
    /// Redshift
    pub z: f64,
    /// Omega_m
    pub omega_m: f64,
    /// Omega_Lambda
    pub omega_l: f64,
    /// H0 / (100 km/s/Mpc)
    pub h100: f64,
    /// Box width in comoving Mpc/h
    pub l: f64,
    /// Particle mass in Msun/h
    pub mass: f64,
}

impl PreambleV1 {
    /// Encoded size in bytes
    pub const SIZE: u64 = 96;
}

/// Fixed-width preamble of version 2 files
#[derive(Debug, Clone, PartialEq, BinRead, BinWrite)]
pub struct PreambleV2 {
    /// Writer-defined format code
    pub format: u64,
    /// Particles in this file
    pub n: i64,
    /// Particles in the full simulation
    pub n_tot: i64,
    /// Slab dimensions
    pub span: [i64; 3],
    /// Slab origin within the global decomposition
    pub origin: [i64; 3],
    /// Dimensions of the global decomposition
    pub total_span: [i64; 3],
    /// ID of the first particle in the file
    pub id_offset: u64,
    /// Redshift
    pub z: f64,
    /// Omega_m
    pub omega_m: f64,
    /// Omega_Lambda
    pub omega_l: f64,
    /// H0 / (100 km/s/Mpc)
    pub h100: f64,
    /// Box width in comoving Mpc/h
    pub l: f64,
    /// Particle mass in Msun/h
    pub mass: f64,
}

impl PreambleV2 {
    /// Encoded size in bytes
    pub const SIZE: u64 = 152;
}

impl From<PreambleV1> for PreambleV2 {
    fn from(v1: PreambleV1) -> Self {
        Self {
            format: 0,
            n: v1.n,
            n_tot: v1.n_tot,
            span: v1.span,
            origin: [0; 3],
            total_span: v1.span,
            id_offset: v1.id_offset,
            z: v1.z,
            omega_m: v1.omega_m,
            omega_l: v1.omega_l,
            h100: v1.h100,
            l: v1.l,
            mass: v1.mass,
        }
    }
}

/// Decoded file header. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Header version read from the file
    pub version: u32,
    /// Writer-defined format code (0 for version 1 files)
    pub format: u64,
    /// Byte order of the file
    pub endian: Endian,
    /// Verbatim native header of the source simulation
    pub original_header: Vec<u8>,
    /// Stored column names, in column order
    pub names: Vec<String>,
    /// Element type of each column
    pub types: Vec<ScalarType>,
    /// Components per particle of each column (1 or 3)
    pub widths: Vec<u8>,
    /// Particles in this file
    pub n: u64,
    /// Particles in the full simulation
    pub n_tot: u64,
    /// Slab dimensions
    pub span: [i64; 3],
    /// Slab origin within the global decomposition
    pub origin: [i64; 3],
    /// Dimensions of the global decomposition
    pub total_span: [i64; 3],
    /// ID of the first particle, used when `id` is not stored
    pub id_offset: u64,
    /// Redshift
    pub z: f64,
    /// Omega_m
    pub omega_m: f64,
    /// Omega_Lambda
    pub omega_l: f64,
    /// H0 / (100 km/s/Mpc)
    pub h100: f64,
    /// Box width in comoving Mpc/h
    pub l: f64,
    /// Particle mass in Msun/h
    pub mass: f64,
    /// Length of the header section; column data starts here
    pub data_offset: u64,
}

impl Header {
    /// Number of stored columns
    pub fn n_vars(&self) -> usize {
        self.names.len()
    }

    /// Particle count as a buffer length
    pub fn len(&self) -> usize {
        self.n as usize
    }

    /// True when the file holds no particles
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Per-element byte width of each column
    pub fn sizes(&self) -> Vec<usize> {
        self.types.iter().map(|t| t.size()).collect()
    }

    /// Index of a stored column
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// True if column `index` stores three components per particle
    pub fn is_vector(&self, index: usize) -> bool {
        self.widths.get(index).is_some_and(|w| *w == 3)
    }

    /// Bytes occupied by column `index`
    pub fn column_extent(&self, index: usize) -> u64 {
        match (self.types.get(index), self.widths.get(index)) {
            (Some(scalar), Some(width)) => (u64::from(*width) * scalar.size() as u64)
                .saturating_mul(self.n),
            _ => 0,
        }
    }

    /// Absolute byte offset where column `index` starts
    pub fn column_offset(&self, index: usize) -> u64 {
        (0..index.min(self.n_vars()))
            .map(|j| self.column_extent(j))
            .fold(self.data_offset, u64::saturating_add)
    }

    /// Offset one past the last column
    pub fn data_end(&self) -> u64 {
        self.column_offset(self.n_vars())
    }
}

/// Tracks how much of the input the declared layout has consumed
struct Bounds {
    pos: u64,
    len: u64,
}

impl Bounds {
    const fn new(len: u64) -> Self {
        Self { pos: 0, len }
    }

    fn take(&mut self, need: u64) -> FormatResult<()> {
        match self.pos.checked_add(need) {
            Some(end) if end <= self.len => {
                self.pos = end;
                Ok(())
            }
            _ => Err(FormatError::Truncated {
                expected: self.pos.saturating_add(need),
                actual: self.len,
            }),
        }
    }
}

fn read_u32<R: Read + Seek>(reader: &mut R, endian: Endian) -> FormatResult<u32> {
    Ok(u32::read_options(reader, endian, ())?)
}

/// Decode a header from the start of an in-memory file image
pub fn decode_header(data: &[u8]) -> FormatResult<Header> {
    let mut cursor = Cursor::new(data);
    read_header_from(&mut cursor, data.len() as u64)
}

/// Decode a header from a reader over a file of `len` bytes.
///
/// The reader is rewound to the start first. Fails if the magic or version
/// is not recognized, or if the declared counts would read past `len`.
pub fn read_header_from<R: Read + Seek>(reader: &mut R, len: u64) -> FormatResult<Header> {
    reader.seek(SeekFrom::Start(0))?;
    let mut bounds = Bounds::new(len);

    bounds.take(IDENT_SIZE)?;
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    let endian = match u32::from_le_bytes(magic) {
        MAGIC => Endian::Little,
        REVERSE_MAGIC => Endian::Big,
        other => return Err(FormatError::InvalidMagic(other)),
    };
    let version = read_u32(reader, endian)?;

    let preamble = match version {
        1 => {
            bounds.take(PreambleV1::SIZE)?;
            PreambleV2::from(PreambleV1::read_options(reader, endian, ())?)
        }
        2 => {
            bounds.take(PreambleV2::SIZE)?;
            PreambleV2::read_options(reader, endian, ())?
        }
        found => {
            return Err(FormatError::UnsupportedVersion {
                found,
                supported: CURRENT_VERSION,
            });
        }
    };

    if preamble.n < 0 || preamble.n_tot < preamble.n {
        return Err(FormatError::InvalidCounts {
            n: preamble.n,
            n_tot: preamble.n_tot,
        });
    }

    bounds.take(4)?;
    let original_len = read_u32(reader, endian)?;
    bounds.take(u64::from(original_len))?;
    let mut original_header = vec![0u8; original_len as usize];
    reader.read_exact(&mut original_header)?;

    bounds.take(4)?;
    let n_vars = read_u32(reader, endian)? as usize;
    bounds.take(4 * n_vars as u64)?;
    let mut name_lengths = Vec::with_capacity(n_vars);
    for _ in 0..n_vars {
        name_lengths.push(read_u32(reader, endian)?);
    }

    bounds.take(name_lengths.iter().map(|l| u64::from(*l)).sum())?;
    let mut names = Vec::with_capacity(n_vars);
    let mut seen = HashSet::with_capacity(n_vars);
    for length in name_lengths {
        let mut raw = vec![0u8; length as usize];
        reader.read_exact(&mut raw)?;
        let name = String::from_utf8(raw)
            .map_err(|e| FormatError::InvalidName(format!("not UTF-8: {e}")))?;
        if name.is_empty() {
            return Err(FormatError::InvalidName("empty name".to_string()));
        }
        if !seen.insert(name.clone()) {
            return Err(FormatError::DuplicateName(name));
        }
        names.push(name);
    }

    bounds.take(3 * n_vars as u64)?;
    let mut types = Vec::with_capacity(n_vars);
    for _ in 0..n_vars {
        let mut tag = [0u8; 3];
        reader.read_exact(&mut tag)?;
        types.push(ScalarType::from_tag_bytes(tag)?);
    }

    let widths = if version >= 2 {
        bounds.take(n_vars as u64)?;
        let mut raw = vec![0u8; n_vars];
        reader.read_exact(&mut raw)?;
        for (name, width) in names.iter().zip(&raw) {
            if *width != 1 && *width != 3 {
                return Err(FormatError::InvalidWidth {
                    name: name.clone(),
                    width: *width,
                });
            }
        }
        raw
    } else {
        names
            .iter()
            .map(|name| if LEGACY_VECTOR_NAMES.contains(&name.as_str()) { 3 } else { 1 })
            .collect()
    };

    let header = Header {
        version,
        format: preamble.format,
        endian,
        original_header,
        names,
        types,
        widths,
        n: preamble.n as u64,
        n_tot: preamble.n_tot as u64,
        span: preamble.span,
        origin: preamble.origin,
        total_span: preamble.total_span,
        id_offset: preamble.id_offset,
        z: preamble.z,
        omega_m: preamble.omega_m,
        omega_l: preamble.omega_l,
        h100: preamble.h100,
        l: preamble.l,
        mass: preamble.mass,
        data_offset: bounds.pos,
    };

    let data_size = (0..header.n_vars())
        .try_fold(0u64, |acc, j| acc.checked_add(header.column_extent(j)))
        .unwrap_or(u64::MAX);
    bounds.take(data_size)?;
    if bounds.pos < len {
        warn!(
            "{} trailing bytes after the last column (data ends at {}, file is {} bytes)",
            len - bounds.pos,
            bounds.pos,
            len
        );
    }

    debug!(
        "Decoded guppy v{} header: {} particles, {} columns, data at {}",
        header.version,
        header.n,
        header.n_vars(),
        header.data_offset
    );

    Ok(header)
}
