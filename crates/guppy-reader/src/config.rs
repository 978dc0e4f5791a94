//! Configuration for the reader and its worker pool

use serde::{Deserialize, Serialize};

use crate::{ReaderError, Result};

/// Configuration for a [`crate::Reader`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Number of pooled workers created up front
    pub workers: usize,

    /// Initial capacity of each worker's scratch buffer (in bytes)
    pub scratch_capacity: usize,

    /// Keep each worker's file handle open between reads of the same file
    pub reuse_file_handles: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            scratch_capacity: 1024 * 1024, // 1 MiB
            reuse_file_handles: true,
        }
    }
}

impl ReaderConfig {
    /// Create a configuration with `workers` pooled workers
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Set the number of pooled workers
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the initial scratch buffer capacity
    #[must_use]
    pub const fn with_scratch_capacity(mut self, bytes: usize) -> Self {
        self.scratch_capacity = bytes;
        self
    }

    /// Enable or disable file handle reuse
    #[must_use]
    pub const fn with_file_reuse(mut self, enable: bool) -> Self {
        self.reuse_file_handles = enable;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ReaderError::Config(
                "workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
