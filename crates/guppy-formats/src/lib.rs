//! Header, variable-expression, and type-conversion layer for Guppy files
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::derive_partial_eq_without_eq)] // Headers carry f64 parameters
//! Guppy files hold the particles of one slab of an N-body simulation,
//! stored column by column. This crate decodes the header that describes
//! those columns, parses the variable expressions callers use to name what
//! they want, and converts stored elements into the caller's element type.
//! It does no file I/O of its own beyond decoding from a reader.
//!
//! # Modules
//!
//! - **header**: magic/version discriminator, versioned preambles, the
//!   variable table, and column offsets
//! - **expression**: `name`, `name[k]`, and `[RockstarParticle]` expressions
//!   and the column accesses they resolve to
//! - **convert**: `u32`/`u64`/`f32`/`f64` element conversion, with strided
//!   access for interleaved vector columns
//! - **rockstar**: the 32-byte composite particle record

#![warn(missing_docs)]

pub mod convert;
mod error;
pub mod expression;
pub mod header;
pub mod rockstar;

pub use binrw::Endian;
pub use convert::{Element, ScalarType, convert, convert_strided};
pub use error::{FormatError, FormatResult};
pub use expression::{
    ColumnAccess, ColumnSource, CompositeKind, VariableExpression, resolve, resolve_all,
};
pub use header::{
    CURRENT_VERSION, Header, MAGIC, PreambleV1, PreambleV2, REVERSE_MAGIC, decode_header,
    read_header_from,
};
pub use rockstar::{ROCKSTAR_RECORD_SIZE, RockstarParticle, encode_records};
