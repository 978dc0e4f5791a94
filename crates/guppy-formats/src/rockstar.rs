//! Rockstar particle record
//!
//! The composite `[RockstarParticle]` read produces records with the same
//! layout Rockstar uses internally, so arrays of them can be handed to the
//! halo finder without another copy.

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, Endian};

use crate::error::FormatResult;

/// Size of one encoded record in bytes: `u64` id, three `f32` positions,
/// three `f32` velocities.
pub const ROCKSTAR_RECORD_SIZE: usize = 32;

/// One particle as laid out by Rockstar
#[derive(Debug, Clone, Copy, Default, PartialEq, BinRead, BinWrite)]
#[repr(C)]
pub struct RockstarParticle {
    /// Particle identifier
    pub id: u64,
    /// Position
    pub x: [f32; 3],
    /// Velocity
    pub v: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<RockstarParticle>() == ROCKSTAR_RECORD_SIZE);

impl RockstarParticle {
    /// Create a record from its fields
    pub const fn new(id: u64, x: [f32; 3], v: [f32; 3]) -> Self {
        Self { id, x, v }
    }

    /// Decode one record
    pub fn from_bytes(data: &[u8], endian: Endian) -> FormatResult<Self> {
        let mut cursor = Cursor::new(data);
        Ok(Self::read_options(&mut cursor, endian, ())?)
    }
}

/// Encode records back to back with no padding
pub fn encode_records(records: &[RockstarParticle], endian: Endian) -> FormatResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(records.len() * ROCKSTAR_RECORD_SIZE));
    for record in records {
        record.write_options(&mut cursor, endian, ())?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let particle =
            RockstarParticle::new(0x0102_0304_0506_0708, [1.0, 2.0, 3.0], [-1.0, 0.5, 0.0]);
        let bytes = encode_records(&[particle], Endian::Little).unwrap();

        assert_eq!(bytes.len(), ROCKSTAR_RECORD_SIZE);
        assert_eq!(&bytes[0..8], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[20..24], &(-1.0f32).to_le_bytes());
        assert_eq!(&bytes[28..32], &0.0f32.to_le_bytes());

        let decoded = RockstarParticle::from_bytes(&bytes, Endian::Little).unwrap();
        assert_eq!(decoded, particle);
    }

    #[test]
    fn test_short_record_fails() {
        assert!(RockstarParticle::from_bytes(&[0u8; 31], Endian::Little).is_err());
    }
}
