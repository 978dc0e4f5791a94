//! Test utilities for guppy-rs
//!
//! Builds Guppy files in memory or on disk for tests, and locates real
//! simulation output when the environment points at some.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss, clippy::missing_panics_doc)]
#![allow(clippy::expect_used)] // Test-only crate

use std::io::Write;
use std::path::{Path, PathBuf};

use binrw::io::Cursor;
use binrw::{BinWrite, Endian};
use guppy_formats::convert::Element;
use guppy_formats::{MAGIC, PreambleV1, PreambleV2, ScalarType};
use tempfile::NamedTempFile;

/// Environment variable naming a directory of real `.gup` files
pub const TEST_DATA_ENV: &str = "GUPPY_TEST_DATA";

/// Values of one fixture column, flattened (vector columns hold `3 * n`)
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// `u32` elements
    U32(Vec<u32>),
    /// `u64` elements
    U64(Vec<u64>),
    /// `f32` elements
    F32(Vec<f32>),
    /// `f64` elements
    F64(Vec<f64>),
}

impl ColumnValues {
    /// Stored element type
    pub const fn scalar(&self) -> ScalarType {
        match self {
            Self::U32(_) => ScalarType::U32,
            Self::U64(_) => ScalarType::U64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Self::U32(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    /// True when there are no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn encode(&self, endian: Endian, out: &mut Vec<u8>) {
        fn all<T: Element>(values: &[T], endian: Endian, out: &mut Vec<u8>) {
            for value in values {
                value.encode(endian, out);
            }
        }
        match self {
            Self::U32(v) => all(v, endian, out),
            Self::U64(v) => all(v, endian, out),
            Self::F32(v) => all(v, endian, out),
            Self::F64(v) => all(v, endian, out),
        }
    }
}

impl From<Vec<u32>> for ColumnValues {
    fn from(values: Vec<u32>) -> Self {
        Self::U32(values)
    }
}

impl From<Vec<u64>> for ColumnValues {
    fn from(values: Vec<u64>) -> Self {
        Self::U64(values)
    }
}

impl From<Vec<f32>> for ColumnValues {
    fn from(values: Vec<f32>) -> Self {
        Self::F32(values)
    }
}

impl From<Vec<f64>> for ColumnValues {
    fn from(values: Vec<f64>) -> Self {
        Self::F64(values)
    }
}

/// One column of a fixture file
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureColumn {
    /// Column name
    pub name: String,
    /// Components per particle
    pub width: u8,
    /// Flattened values
    pub values: ColumnValues,
}

/// Builds Guppy file images for tests
#[derive(Debug, Clone)]
pub struct GuppyFileBuilder {
    version: u32,
    endian: Endian,
    preamble: PreambleV2,
    original_header: Vec<u8>,
    columns: Vec<FixtureColumn>,
}

impl GuppyFileBuilder {
    /// Start a version 2, little-endian file holding `n` particles
    pub fn new(n: usize) -> Self {
        let n = n as i64;
        Self {
            version: 2,
            endian: Endian::Little,
            preamble: PreambleV2 {
                format: 1,
                n,
                n_tot: n * 8,
                span: [n, 1, 1],
                origin: [0, 0, 0],
                total_span: [n * 2, 2, 2],
                id_offset: 0,
                z: 1.0,
                omega_m: 0.27,
                omega_l: 0.73,
                h100: 0.7,
                l: 125.0,
                mass: 1.7e9,
            },
            original_header: b"gadget2 header".to_vec(),
            columns: Vec::new(),
        }
    }

    /// Header version to write (1 or 2)
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Byte order to write
    #[must_use]
    pub const fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// ID of the first particle
    #[must_use]
    pub const fn id_offset(mut self, id_offset: u64) -> Self {
        self.preamble.id_offset = id_offset;
        self
    }

    /// Slab geometry
    #[must_use]
    pub const fn geometry(
        mut self,
        span: [i64; 3],
        origin: [i64; 3],
        total_span: [i64; 3],
    ) -> Self {
        self.preamble.span = span;
        self.preamble.origin = origin;
        self.preamble.total_span = total_span;
        self
    }

    /// Native header bytes to embed
    #[must_use]
    pub fn original_header(mut self, bytes: &[u8]) -> Self {
        self.original_header = bytes.to_vec();
        self
    }

    /// Add a scalar column
    #[must_use]
    pub fn scalar(self, name: &str, values: impl Into<ColumnValues>) -> Self {
        self.column(name, 1, values)
    }

    /// Add a vector column from flattened, per-particle interleaved values
    #[must_use]
    pub fn vector(self, name: &str, values: impl Into<ColumnValues>) -> Self {
        self.column(name, 3, values)
    }

    /// Add a column with an explicit width
    #[must_use]
    pub fn column(mut self, name: &str, width: u8, values: impl Into<ColumnValues>) -> Self {
        self.columns.push(FixtureColumn {
            name: name.to_string(),
            width,
            values: values.into(),
        });
        self
    }

    /// The columns added so far
    pub fn columns(&self) -> &[FixtureColumn] {
        &self.columns
    }

    /// Length of the header section this builder writes
    pub fn header_len(&self) -> u64 {
        let preamble = if self.version == 1 {
            PreambleV1::SIZE
        } else {
            PreambleV2::SIZE
        };
        let names: usize = self.columns.iter().map(|c| c.name.len()).sum();
        let per_column = if self.version >= 2 { 4 + 3 + 1 } else { 4 + 3 };
        8 + preamble
            + 4
            + self.original_header.len() as u64
            + 4
            + (self.columns.len() * per_column) as u64
            + names as u64
    }

    fn put<T>(&self, out: &mut Vec<u8>, value: &T)
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        let mut cursor = Cursor::new(Vec::new());
        value
            .write_options(&mut cursor, self.endian, ())
            .expect("in-memory write cannot fail");
        out.extend_from_slice(&cursor.into_inner());
    }

    /// Encode the file image
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.put(&mut out, &MAGIC);
        self.put(&mut out, &self.version);

        if self.version == 1 {
            let p = &self.preamble;
            let v1 = PreambleV1 {
                n: p.n,
                n_tot: p.n_tot,
                span: p.span,
                id_offset: p.id_offset,
                z: p.z,
                omega_m: p.omega_m,
                omega_l: p.omega_l,
                h100: p.h100,
                l: p.l,
                mass: p.mass,
            };
            self.put(&mut out, &v1);
        } else {
            self.put(&mut out, &self.preamble);
        }

        self.put(&mut out, &(self.original_header.len() as u32));
        out.extend_from_slice(&self.original_header);

        self.put(&mut out, &(self.columns.len() as u32));
        for column in &self.columns {
            self.put(&mut out, &(column.name.len() as u32));
        }
        for column in &self.columns {
            out.extend_from_slice(column.name.as_bytes());
        }
        for column in &self.columns {
            out.extend_from_slice(column.values.scalar().tag().as_bytes());
        }
        if self.version >= 2 {
            out.extend(self.columns.iter().map(|c| c.width));
        }

        for column in &self.columns {
            column.values.encode(self.endian, &mut out);
        }
        out
    }

    /// Write the file image to `dir/name`
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("failed to write fixture file");
        path
    }

    /// Write the file image to a fresh temporary file
    pub fn write_temp(&self) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".gup")
            .tempfile()
            .expect("failed to create temp file");
        file.write_all(&self.build())
            .expect("failed to write fixture file");
        file.flush().expect("failed to flush fixture file");
        file
    }
}

/// Deterministic position values: particle `i`, component `k` is `i + k / 10`
pub fn positions(n: usize) -> Vec<f32> {
    (0..n)
        .flat_map(|i| (0..3).map(move |k| i as f32 + k as f32 / 10.0))
        .collect()
}

/// Deterministic velocity values: particle `i`, component `k` is `-(i * 3 + k)`
pub fn velocities(n: usize) -> Vec<f32> {
    (0..n)
        .flat_map(|i| (0..3).map(move |k| -((i * 3 + k) as f32)))
        .collect()
}

/// A file shaped like simulation output: `x` and `v` vectors plus a
/// potential column `phi`, with identifiers left implicit.
pub fn particle_fixture(n: usize) -> GuppyFileBuilder {
    GuppyFileBuilder::new(n)
        .vector("x", positions(n))
        .vector("v", velocities(n))
        .scalar("phi", (0..n).map(|i| i as f64 * 0.5).collect::<Vec<f64>>())
}

/// Directory of real `.gup` files named by [`TEST_DATA_ENV`], if it exists
pub fn find_guppy_data() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os(TEST_DATA_ENV)?);
    path.is_dir().then_some(path)
}

/// All `.gup` files in the test data directory
pub fn guppy_data_files() -> Vec<PathBuf> {
    let Some(dir) = find_guppy_data() else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "gup"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

/// Get the real test data directory or skip the test with a message
#[macro_export]
macro_rules! require_guppy_data {
    () => {
        match $crate::find_guppy_data() {
            Some(path) => path,
            None => {
                println!(
                    "Skipping test - set {} to a directory of .gup files",
                    $crate::TEST_DATA_ENV
                );
                return;
            }
        }
    };
}
