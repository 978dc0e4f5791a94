//! Per-worker read state
//!
//! A worker owns a growable scratch buffer and, optionally, the handle of
//! the last file it read. Workers are not shared: the pool hands each one
//! to a single caller at a time.

use std::fs::{File, Metadata};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use guppy_formats::{Header, read_header_from};
use tracing::{debug, trace};

use crate::{ReaderError, Result};

fn no_open_file() -> ReaderError {
    ReaderError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "worker has no open file",
    ))
}

/// What a path resolved to when it was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    len: u64,
    modified: Option<std::time::SystemTime>,
}

impl FileIdentity {
    fn of(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        use std::os::unix::fs::MetadataExt;

        Self {
            #[cfg(unix)]
            dev: metadata.dev(),
            #[cfg(unix)]
            ino: metadata.ino(),
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

#[derive(Debug)]
struct OpenFile {
    path: PathBuf,
    file: File,
    identity: FileIdentity,
}

/// Scratch buffer plus cached file handle
#[derive(Debug)]
pub struct Worker {
    scratch: Vec<u8>,
    open: Option<OpenFile>,
    reuse_files: bool,
}

impl Worker {
    /// Create a worker with `scratch_capacity` bytes reserved up front
    pub fn new(scratch_capacity: usize, reuse_files: bool) -> Self {
        Self {
            scratch: Vec::with_capacity(scratch_capacity),
            open: None,
            reuse_files,
        }
    }

    /// Make `path` the current file.
    ///
    /// The cached handle is kept if handle reuse is enabled and `path` still
    /// names the same file it was opened from. A file replaced or rewritten
    /// at that path is opened again.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        if self.reuse_files
            && let Some(open) = self.open.as_ref().filter(|open| open.path.as_path() == path)
        {
            if FileIdentity::of(&std::fs::metadata(path)?) == open.identity {
                trace!("Reusing open handle for {}", path.display());
                return Ok(());
            }
            debug!("{} changed since it was opened", path.display());
        }

        let file = File::open(path)?;
        let identity = FileIdentity::of(&file.metadata()?);
        debug!("Opened {}", path.display());
        self.open = Some(OpenFile {
            path: path.to_path_buf(),
            file,
            identity,
        });
        Ok(())
    }

    /// Path of the current file, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.open.as_ref().map(|open| open.path.as_path())
    }

    fn file(&mut self) -> Result<&mut File> {
        self.open
            .as_mut()
            .map(|open| &mut open.file)
            .ok_or_else(no_open_file)
    }

    /// Decode the header of the current file
    pub fn read_header(&mut self) -> Result<Header> {
        let file = self.file()?;
        let len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        Ok(read_header_from(&mut reader, len)?)
    }

    /// Read `len` bytes at `offset` of the current file into the scratch
    /// buffer, growing it if needed.
    pub fn read_range(&mut self, offset: u64, len: u64) -> Result<&[u8]> {
        let len = usize::try_from(len).map_err(|_| {
            ReaderError::Io(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                format!("column of {len} bytes does not fit in memory"),
            ))
        })?;

        // Borrow the handle and the scratch buffer separately
        let Some(OpenFile { file, .. }) = self.open.as_mut() else {
            return Err(no_open_file());
        };

        if self.scratch.capacity() < len {
            debug!(
                "Growing scratch buffer from {} to {} bytes",
                self.scratch.capacity(),
                len
            );
        }
        self.scratch.resize(len, 0);

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut self.scratch)?;
        trace!("Read {} bytes at offset {}", len, offset);
        Ok(&self.scratch)
    }

    /// Bytes from the last [`Worker::read_range`]
    pub fn scratch(&self) -> &[u8] {
        &self.scratch
    }

    /// Reserved scratch capacity in bytes
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Finish a read; drops the file handle unless reuse is enabled
    pub fn finish(&mut self) {
        if !self.reuse_files {
            self.close();
        }
    }

    /// Drop the cached file handle
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            trace!("Closed {}", open.path.display());
        }
    }
}
