//! Read orchestration: header, expression, worker, and output buffer

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use guppy_formats::{ColumnAccess, ColumnSource, Header, VariableExpression, decode_header};
use memmap2::MmapOptions;
use tracing::{debug, trace};

use crate::buffer::{BufferShape, OutputBuffer};
use crate::pool::{WorkerPool, WorkerSelector};
use crate::worker::Worker;
use crate::{ReaderConfig, Result};

/// Decode the header of the file at `path` without touching the worker pool
pub fn read_header(path: impl AsRef<Path>) -> Result<Header> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(decode_header(&[])?);
    }

    // Memory-map the file; only the header section is touched
    #[allow(unsafe_code)]
    let mmap = unsafe { MmapOptions::new().map(&file)? };

    let header = decode_header(&mmap)?;
    debug!(
        "Read header of {}: version {}, {} particles, {} variables",
        path.display(),
        header.version,
        header.n,
        header.n_vars()
    );
    Ok(header)
}

/// Output layout an expression needs
fn expected_shape(expression: &VariableExpression, accesses: &[ColumnAccess]) -> BufferShape {
    match expression {
        VariableExpression::Composite(_) => BufferShape::Rockstar,
        _ if accesses.first().is_some_and(ColumnAccess::is_whole_vector) => BufferShape::Vector,
        _ => BufferShape::Flat,
    }
}

/// Resolve `expression` against `header` and check it fits `out`
fn plan(expression: &str, header: &Header, out: &OutputBuffer<'_>) -> Result<Vec<ColumnAccess>> {
    let parsed = VariableExpression::parse(expression)?;
    let accesses = parsed.plan(header)?;
    out.check(expression, expected_shape(&parsed, &accesses), header.len())?;
    Ok(accesses)
}

/// Read every access of a plan into `out`.
///
/// Consecutive accesses to the same column share one read.
fn execute(
    worker: &mut Worker,
    header: &Header,
    accesses: &[ColumnAccess],
    out: &mut OutputBuffer<'_>,
) -> Result<()> {
    let mut loaded = None;
    for (field, access) in accesses.iter().enumerate() {
        match access.source {
            ColumnSource::Stored {
                index,
                offset,
                extent,
            } => {
                if loaded != Some(index) {
                    debug!(
                        "Reading column '{}' ({} bytes at offset {})",
                        header.names[index], extent, offset
                    );
                    worker.read_range(offset, extent)?;
                    loaded = Some(index);
                }
                out.fill(field, access, worker.scratch(), header.endian)?;
            }
            ColumnSource::ImplicitId { start } => {
                trace!("Synthesizing ids from {}", start);
                out.fill(field, access, &[], header.endian)?;
            }
        }
    }
    Ok(())
}

fn read_one(
    worker: &mut Worker,
    path: &Path,
    expression: &str,
    out: &mut OutputBuffer<'_>,
) -> Result<()> {
    worker.open(path)?;
    let header = worker.read_header()?;
    let accesses = plan(expression, &header, out)?;
    execute(worker, &header, &accesses, out)
}

fn read_many(
    worker: &mut Worker,
    path: &Path,
    requests: &mut [(&str, OutputBuffer<'_>)],
) -> Result<()> {
    worker.open(path)?;
    let header = worker.read_header()?;

    let plans = requests
        .iter()
        .map(|(expression, out)| plan(expression, &header, out))
        .collect::<Result<Vec<_>>>()?;

    for ((_, out), accesses) in requests.iter_mut().zip(&plans) {
        execute(worker, &header, accesses, out)?;
    }
    Ok(())
}

/// Reads variables from Guppy files through a shared worker pool.
///
/// A `Reader` is `Sync`; clone the `Arc` around it, or share its pool with
/// [`Reader::with_pool`], to read from many threads.
#[derive(Debug, Clone)]
pub struct Reader {
    pool: Arc<WorkerPool>,
}

impl Reader {
    /// Create a reader whose pool has `config.workers` workers
    pub fn new(config: ReaderConfig) -> Result<Self> {
        let pool = WorkerPool::new(&config)?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create a reader over an existing pool, which may be uninitialized
    pub fn with_pool(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// The reader's worker pool
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Replace the pool's workers with `n` fresh ones
    pub fn init_workers(&self, n: usize) -> Result<()> {
        self.pool.init_workers(n)
    }

    /// Decode the header of the file at `path`
    pub fn read_header(&self, path: impl AsRef<Path>) -> Result<Header> {
        read_header(path)
    }

    /// Read one expression into `out`.
    ///
    /// `out` must hold exactly one entry per particle and have the layout
    /// the expression needs: flat for scalar columns and components, triplets
    /// for whole vector columns, records for `[RockstarParticle]`.
    pub fn read_var(
        &self,
        path: impl AsRef<Path>,
        expression: &str,
        selector: WorkerSelector,
        mut out: OutputBuffer<'_>,
    ) -> Result<()> {
        let mut worker = self.pool.acquire(selector)?;
        let result = read_one(&mut worker, path.as_ref(), expression, &mut out);
        worker.finish();
        self.pool.release(worker);
        result
    }

    /// Read several expressions from one file with a single worker.
    ///
    /// Every expression and buffer is checked against the header before any
    /// column data is read, so a bad request leaves all buffers untouched.
    pub fn read_vars(
        &self,
        path: impl AsRef<Path>,
        selector: WorkerSelector,
        requests: &mut [(&str, OutputBuffer<'_>)],
    ) -> Result<()> {
        let mut worker = self.pool.acquire(selector)?;
        let result = read_many(&mut worker, path.as_ref(), requests);
        worker.finish();
        self.pool.release(worker);
        result
    }
}
