//! Format error types

use thiserror::Error;

/// Errors raised while decoding a Guppy header or resolving a variable
/// expression against it.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file does not start with the Guppy magic number in either byte order
    #[error(
        "not a guppy file: expected magic 0x{magic:08X} or 0x{reversed:08X}, got 0x{0:08X}",
        magic = crate::MAGIC,
        reversed = crate::REVERSE_MAGIC
    )]
    InvalidMagic(u32),

    /// The file was written by a newer (or unknown) version of the format
    #[error("unsupported guppy version {found} (this reader supports versions 1..={supported})")]
    UnsupportedVersion {
        /// Version found in the file
        found: u32,
        /// Highest version this reader understands
        supported: u32,
    },

    /// A variable carries a type tag outside {u32, u64, f32, f64}
    #[error("unknown type tag {0:?}")]
    UnknownTypeTag(String),

    /// A variable declares a component count other than 1 or 3
    #[error("variable '{name}' has invalid component width {width}")]
    InvalidWidth {
        /// Variable name
        name: String,
        /// Declared width
        width: u8,
    },

    /// A variable name is not valid UTF-8 or is empty
    #[error("invalid variable name: {0}")]
    InvalidName(String),

    /// The same variable name appears twice in the table
    #[error("duplicate variable name '{0}'")]
    DuplicateName(String),

    /// Particle counts are negative or inconsistent
    #[error("invalid particle counts: n = {n}, n_tot = {n_tot}")]
    InvalidCounts {
        /// Particles in this file
        n: i64,
        /// Particles in the whole simulation
        n_tot: i64,
    },

    /// The declared layout reads past the end of the data
    #[error("truncated file: layout requires {expected} bytes, only {actual} available")]
    Truncated {
        /// Bytes required by the declared layout
        expected: u64,
        /// Bytes actually available
        actual: u64,
    },

    /// The expression names a variable that is not in the file
    #[error(
        "the file has no variable named '{name}'; it only contains [{}]",
        .available.join(", ")
    )]
    UnknownVariable {
        /// Requested name
        name: String,
        /// Names stored in the file
        available: Vec<String>,
    },

    /// A component index outside 0..=2, or an index applied to a scalar
    #[error("component index {index} is out of range for variable '{name}'")]
    IndexOutOfRange {
        /// Variable name
        name: String,
        /// Requested index
        index: usize,
    },

    /// The expression string does not follow the variable grammar
    #[error("invalid variable expression {0:?}")]
    InvalidExpression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

impl FormatError {
    /// True for the errors a caller can fix by correcting the expression
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownVariable { .. } | Self::IndexOutOfRange { .. } | Self::InvalidExpression(_)
        )
    }
}

/// Result type for format operations
pub type FormatResult<T> = Result<T, FormatError>;
