//! Concurrent reader for Guppy particle files.
//!
//! This crate turns the decoding primitives in `guppy-formats` into file
//! reads. A [`Reader`] owns a [`WorkerPool`] of reusable workers; each worker
//! keeps a scratch buffer and an open file handle so repeated reads of the
//! same file avoid reallocation and reopening.
//!
//! # Worker selection
//!
//! - [`WorkerSelector::Auto`] takes whichever pooled worker is free first,
//!   blocking until one is released
//! - [`WorkerSelector::Pinned`] locks one specific pooled worker
//! - [`WorkerSelector::Private`] uses a throwaway worker outside the pool
//!
//! # Example
//!
//! ```rust,no_run
//! use guppy_reader::{OutputBuffer, Reader, ReaderConfig, WorkerSelector};
//!
//! # fn example() -> guppy_reader::Result<()> {
//! let reader = Reader::new(ReaderConfig::new(4))?;
//! let header = reader.read_header("snap_100.0.gup")?;
//!
//! let mut x0 = vec![0.0f32; header.len()];
//! reader.read_var(
//!     "snap_100.0.gup",
//!     "x[0]",
//!     WorkerSelector::Auto,
//!     OutputBuffer::from(&mut x0),
//! )?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use thiserror::Error;

// Output buffers
pub mod buffer;

// Configuration
pub mod config;

// Worker pool and scheduling
pub mod pool;

// Read orchestration
pub mod reader;

// Per-worker file handle and scratch space
pub mod worker;

pub use buffer::{BufferShape, OutputBuffer};
pub use config::ReaderConfig;
pub use guppy_formats::{FormatError, Header, RockstarParticle};
pub use pool::{PoolStats, WorkerHandle, WorkerPool, WorkerSelector};
pub use reader::{Reader, read_header};
pub use worker::Worker;

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors that can occur while reading Guppy files.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The file or expression could not be decoded.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pooled worker was requested before the pool was initialized.
    #[error("worker pool is not initialized")]
    PoolUninitialized,

    /// The worker selector does not name a worker.
    #[error("invalid worker selector {selector} (pool has {workers} workers)")]
    InvalidWorker {
        /// Raw selector value
        selector: i64,
        /// Current pool size
        workers: usize,
    },

    /// A pool was asked for zero workers.
    #[error("invalid worker count {0}: at least one worker is required")]
    InvalidWorkerCount(usize),

    /// The output buffer holds the wrong number of particles.
    #[error("buffer for '{expression}' holds {actual} particles, file has {expected}")]
    BufferSize {
        /// Expression being read
        expression: String,
        /// Particle count of the file
        expected: usize,
        /// Buffer length
        actual: usize,
    },

    /// The output buffer has the wrong layout for the expression.
    #[error("buffer for '{expression}' must be {expected}, got {actual}")]
    BufferShape {
        /// Expression being read
        expression: String,
        /// Layout the expression needs
        expected: BufferShape,
        /// Layout supplied
        actual: BufferShape,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReaderError {
    /// True for errors caused by the caller's request rather than the file
    /// or the filesystem.
    pub fn is_usage_error(&self) -> bool {
        match self {
            Self::Format(e) => e.is_resolution_error(),
            Self::PoolUninitialized
            | Self::InvalidWorker { .. }
            | Self::InvalidWorkerCount(_)
            | Self::BufferSize { .. }
            | Self::BufferShape { .. }
            | Self::Config(_) => true,
            Self::Io(_) => false,
        }
    }
}

/// Version information for the reader.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
