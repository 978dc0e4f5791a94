#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
#![allow(clippy::float_cmp, clippy::cast_precision_loss)]
//! End-to-end reads of fixture files
//!
//! Files are built with `guppy-test-utils`, written to temporary files, and
//! read back through a `Reader` with every worker selector.

use guppy_formats::{Endian, FormatError};
use guppy_reader::{
    BufferShape, OutputBuffer, Reader, ReaderConfig, ReaderError, RockstarParticle,
    WorkerPool, WorkerSelector, read_header,
};
use guppy_test_utils::{GuppyFileBuilder, particle_fixture, positions, velocities};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn reader(workers: usize) -> Reader {
    Reader::new(ReaderConfig::new(workers).with_scratch_capacity(256)).unwrap()
}

// --- Headers ---

#[test]
fn header_describes_fixture() {
    let file = particle_fixture(1000).write_temp();
    let header = read_header(file.path()).unwrap();

    assert_eq!(header.n, 1000);
    assert_eq!(header.names, ["x", "v", "phi"]);
    assert_eq!(header.widths, [3, 3, 1]);
    assert_eq!(header.original_header, b"gadget2 header");
}

#[test]
fn header_reads_are_idempotent() {
    let file = particle_fixture(17).write_temp();
    let reader = reader(1);

    let first = reader.read_header(file.path()).unwrap();
    let second = reader.read_header(file.path()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn header_of_garbage_fails() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), [0u8; 64]).unwrap();

    assert!(matches!(
        read_header(file.path()),
        Err(ReaderError::Format(FormatError::InvalidMagic(0)))
    ));
}

// --- Single variables ---

#[test]
fn component_as_f32() {
    let n = 1000;
    let file = particle_fixture(n).write_temp();
    let reader = reader(2);

    let mut x0 = vec![0.0f32; n];
    reader
        .read_var(file.path(), "x[0]", WorkerSelector::Auto, OutputBuffer::from(&mut x0))
        .unwrap();

    let expected: Vec<f32> = positions(n).chunks(3).map(|p| p[0]).collect();
    assert_eq!(x0, expected);
}

#[test]
fn scalar_column_matches_raw_bytes() {
    let n = 1000;
    let values: Vec<f32> = (0..n).map(|i| (i as f32).mul_add(0.125, -3.0)).collect();
    let file = GuppyFileBuilder::new(n).scalar("x0", values).write_temp();
    let reader = reader(2);

    let header = reader.read_header(file.path()).unwrap();
    let bytes = std::fs::read(file.path()).unwrap();
    assert_eq!(header.data_end(), bytes.len() as u64);

    let mut x0 = vec![0.0f32; n];
    reader
        .read_var(file.path(), "x0", WorkerSelector::Auto, OutputBuffer::from(&mut x0))
        .unwrap();

    let offset = usize::try_from(header.column_offset(0)).unwrap();
    let raw: Vec<f32> = bytes[offset..offset + 4 * n]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(
        x0.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
        raw.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
    );
}

#[test]
fn component_matches_projected_vector() {
    let n = 64;
    let file = particle_fixture(n).write_temp();
    let reader = reader(1);

    let mut v = vec![[0.0f64; 3]; n];
    reader
        .read_var(file.path(), "v", WorkerSelector::Pinned(0), OutputBuffer::from(&mut v))
        .unwrap();

    for k in 0..3 {
        let mut component = vec![0.0f64; n];
        let expression = format!("v[{k}]");
        reader
            .read_var(
                file.path(),
                &expression,
                WorkerSelector::Pinned(0),
                OutputBuffer::from(&mut component),
            )
            .unwrap();

        let projected: Vec<f64> = v.iter().map(|p| p[k]).collect();
        assert_eq!(component, projected, "component {k}");
    }
}

#[test]
fn scalar_converts_to_every_type() {
    let n = 10;
    let file = particle_fixture(n).write_temp();
    let reader = reader(1);

    let mut as_f32 = vec![0.0f32; n];
    let mut as_u64 = vec![0u64; n];
    reader
        .read_var(file.path(), "phi", WorkerSelector::Auto, OutputBuffer::from(&mut as_f32))
        .unwrap();
    reader
        .read_var(file.path(), "phi", WorkerSelector::Auto, OutputBuffer::from(&mut as_u64))
        .unwrap();

    for i in 0..n {
        assert_eq!(as_f32[i], i as f32 * 0.5);
        // 0.5 steps truncate toward zero
        assert_eq!(as_u64[i], i as u64 / 2);
    }
}

#[test]
fn big_endian_file_reads_the_same() {
    let n = 20;
    let little = particle_fixture(n).write_temp();
    let big = particle_fixture(n).endian(Endian::Big).write_temp();
    let reader = reader(1);

    let mut a = vec![[0.0f32; 3]; n];
    let mut b = vec![[0.0f32; 3]; n];
    reader
        .read_var(little.path(), "x", WorkerSelector::Auto, OutputBuffer::from(&mut a))
        .unwrap();
    reader
        .read_var(big.path(), "x", WorkerSelector::Auto, OutputBuffer::from(&mut b))
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn version_1_file_reads() {
    let n = 12;
    let file = particle_fixture(n).version(1).write_temp();
    let reader = reader(1);

    let header = reader.read_header(file.path()).unwrap();
    assert_eq!(header.version, 1);
    assert_eq!(header.widths, [3, 3, 1]);

    let mut x = vec![[0.0f32; 3]; n];
    reader
        .read_var(file.path(), "x", WorkerSelector::Auto, OutputBuffer::from(&mut x))
        .unwrap();
    assert_eq!(x.as_flattened(), positions(n).as_slice());
}

// --- Identifiers ---

#[test]
fn implicit_ids_start_at_offset() {
    let n = 5;
    let file = particle_fixture(n).id_offset(1_000_000).write_temp();
    let reader = reader(1);

    let mut ids = vec![0u64; n];
    reader
        .read_var(file.path(), "id", WorkerSelector::Private, OutputBuffer::from(&mut ids))
        .unwrap();
    assert_eq!(ids, [1_000_000, 1_000_001, 1_000_002, 1_000_003, 1_000_004]);
}

#[test]
fn stored_ids_win_over_offset() {
    let n = 3;
    let file = GuppyFileBuilder::new(n)
        .id_offset(50)
        .scalar("id", vec![9u64, 7, 5])
        .write_temp();
    let reader = reader(1);

    let mut ids = vec![0u64; n];
    reader
        .read_var(file.path(), "id", WorkerSelector::Auto, OutputBuffer::from(&mut ids))
        .unwrap();
    assert_eq!(ids, [9, 7, 5]);
}

// --- Composite records ---

#[test]
fn rockstar_records_reassemble_columns() {
    let n = 40;
    let file = particle_fixture(n).id_offset(100).write_temp();
    let reader = reader(1);

    let mut records = vec![RockstarParticle::default(); n];
    reader
        .read_var(
            file.path(),
            "[RockstarParticle]",
            WorkerSelector::Auto,
            OutputBuffer::from(&mut records),
        )
        .unwrap();

    let x = positions(n);
    let v = velocities(n);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.id, 100 + i as u64);
        assert_eq!(record.x, [x[3 * i], x[3 * i + 1], x[3 * i + 2]]);
        assert_eq!(record.v, [v[3 * i], v[3 * i + 1], v[3 * i + 2]]);
    }
}

#[test]
fn rockstar_records_match_separate_reads() {
    let n = 33;
    let file = particle_fixture(n).id_offset(7).write_temp();
    let reader = reader(2);

    let mut records = vec![RockstarParticle::default(); n];
    let mut x = vec![[0.0f32; 3]; n];
    let mut v = vec![[0.0f32; 3]; n];
    let mut ids = vec![0u64; n];
    reader
        .read_var(
            file.path(),
            "[RockstarParticle]",
            WorkerSelector::Pinned(1),
            OutputBuffer::from(&mut records),
        )
        .unwrap();
    reader
        .read_var(file.path(), "x", WorkerSelector::Auto, OutputBuffer::from(&mut x))
        .unwrap();
    reader
        .read_var(file.path(), "v", WorkerSelector::Private, OutputBuffer::from(&mut v))
        .unwrap();
    reader
        .read_var(file.path(), "id", WorkerSelector::Pinned(0), OutputBuffer::from(&mut ids))
        .unwrap();

    let reassembled: Vec<RockstarParticle> = (0..n)
        .map(|i| RockstarParticle::new(ids[i], x[i], v[i]))
        .collect();
    assert_eq!(records, reassembled);
}

#[test]
fn rockstar_requires_vectors() {
    let file = GuppyFileBuilder::new(4)
        .scalar("phi", vec![0.0f32; 4])
        .write_temp();
    let reader = reader(1);

    let mut records = vec![RockstarParticle::default(); 4];
    let result = reader.read_var(
        file.path(),
        "{RockstarParticle}",
        WorkerSelector::Auto,
        OutputBuffer::from(&mut records),
    );
    assert!(matches!(
        result,
        Err(ReaderError::Format(FormatError::UnknownVariable { .. }))
    ));
}

// --- Request errors ---

#[test]
fn unknown_variable_lists_available() {
    let file = particle_fixture(4).write_temp();
    let reader = reader(1);

    let mut out = vec![0.0f32; 4];
    let err = reader
        .read_var(file.path(), "rho", WorkerSelector::Auto, OutputBuffer::from(&mut out))
        .unwrap_err();

    assert!(err.is_usage_error());
    match err {
        ReaderError::Format(FormatError::UnknownVariable { name, available }) => {
            assert_eq!(name, "rho");
            assert_eq!(available, ["x", "v", "phi"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn component_errors() {
    let file = particle_fixture(4).write_temp();
    let reader = reader(1);
    let mut out = vec![0.0f32; 4];

    for expression in ["x[3]", "phi[0]", "id[1]"] {
        let result = reader.read_var(
            file.path(),
            expression,
            WorkerSelector::Auto,
            OutputBuffer::from(&mut out),
        );
        assert!(
            matches!(
                result,
                Err(ReaderError::Format(FormatError::IndexOutOfRange { .. }))
            ),
            "{expression}: {result:?}"
        );
    }
}

#[test]
fn buffer_size_mismatch() {
    let file = particle_fixture(8).write_temp();
    let reader = reader(1);

    let mut short = vec![0.0f32; 7];
    let result = reader.read_var(
        file.path(),
        "phi",
        WorkerSelector::Auto,
        OutputBuffer::from(&mut short),
    );
    assert!(matches!(
        result,
        Err(ReaderError::BufferSize {
            expected: 8,
            actual: 7,
            ..
        })
    ));
}

#[test]
fn buffer_shape_mismatch() {
    let file = particle_fixture(8).write_temp();
    let reader = reader(1);

    let mut flat = vec![0.0f32; 8];
    let result = reader.read_var(
        file.path(),
        "x",
        WorkerSelector::Auto,
        OutputBuffer::from(&mut flat),
    );
    assert!(matches!(
        result,
        Err(ReaderError::BufferShape {
            expected: BufferShape::Vector,
            actual: BufferShape::Flat,
            ..
        })
    ));

    let mut triplets = vec![[0.0f32; 3]; 8];
    let result = reader.read_var(
        file.path(),
        "x[1]",
        WorkerSelector::Auto,
        OutputBuffer::from(&mut triplets),
    );
    assert!(matches!(result, Err(ReaderError::BufferShape { .. })));
}

#[test]
fn truncated_file_is_rejected() {
    let mut image = particle_fixture(10).build();
    image.truncate(image.len() - 4);
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &image).unwrap();

    let reader = reader(1);
    let mut out = vec![0.0f64; 10];
    let result = reader.read_var(
        file.path(),
        "phi",
        WorkerSelector::Auto,
        OutputBuffer::from(&mut out),
    );
    assert!(matches!(
        result,
        Err(ReaderError::Format(FormatError::Truncated { .. }))
    ));
}

// --- Batched reads ---

#[test]
fn read_vars_fills_every_buffer() {
    let n = 6;
    let file = particle_fixture(n).id_offset(10).write_temp();
    let reader = reader(1);

    let mut x = vec![[0.0f64; 3]; n];
    let mut phi = vec![0.0f32; n];
    let mut ids = vec![0u32; n];
    {
        let mut requests = [
            ("x", OutputBuffer::from(&mut x)),
            ("phi", OutputBuffer::from(&mut phi)),
            ("id", OutputBuffer::from(&mut ids)),
        ];
        reader
            .read_vars(file.path(), WorkerSelector::Auto, &mut requests)
            .unwrap();
    }

    let expected = positions(n);
    assert_eq!(x[2], [6, 7, 8].map(|j| f64::from(expected[j])));
    assert_eq!(phi[5], 2.5);
    assert_eq!(ids, [10, 11, 12, 13, 14, 15]);
}

#[test]
fn read_vars_validates_before_reading() {
    let n = 6;
    let file = particle_fixture(n).write_temp();
    let reader = reader(1);

    let mut phi = vec![-1.0f64; n];
    let mut bad = vec![-1.0f64; n];
    {
        let mut requests = [
            ("phi", OutputBuffer::from(&mut phi)),
            ("missing", OutputBuffer::from(&mut bad)),
        ];
        let result = reader.read_vars(file.path(), WorkerSelector::Auto, &mut requests);
        assert!(matches!(
            result,
            Err(ReaderError::Format(FormatError::UnknownVariable { .. }))
        ));
    }

    // The valid request was not read either
    assert!(phi.iter().all(|&value| value == -1.0));
}

// --- Pool states ---

#[test]
fn uninitialized_pool_only_serves_private_reads() {
    let file = particle_fixture(4).write_temp();
    let pool = Arc::new(WorkerPool::uninitialized(&ReaderConfig::default()));
    let reader = Reader::with_pool(Arc::clone(&pool));

    let mut out = vec![0.0f32; 4];
    assert!(matches!(
        reader.read_var(file.path(), "phi", WorkerSelector::Auto, OutputBuffer::from(&mut out)),
        Err(ReaderError::PoolUninitialized)
    ));
    reader
        .read_var(file.path(), "phi", WorkerSelector::Private, OutputBuffer::from(&mut out))
        .unwrap();
    assert_eq!(out[3], 1.5);

    reader.init_workers(2).unwrap();
    assert_eq!(reader.pool().len(), 2);
    reader
        .read_var(file.path(), "phi", WorkerSelector::Pinned(1), OutputBuffer::from(&mut out))
        .unwrap();
}

#[test]
fn raw_selectors_map_to_workers() {
    let file = particle_fixture(4).write_temp();
    let reader = reader(2);
    let mut out = vec![0.0f32; 4];

    for raw in [-2, -1, 0, 1] {
        let selector = WorkerSelector::from_raw(raw).unwrap();
        reader
            .read_var(file.path(), "phi", selector, OutputBuffer::from(&mut out))
            .unwrap();
    }

    let selector = WorkerSelector::from_raw(2).unwrap();
    assert!(matches!(
        reader.read_var(file.path(), "phi", selector, OutputBuffer::from(&mut out)),
        Err(ReaderError::InvalidWorker {
            selector: 2,
            workers: 2
        })
    ));
}

#[test]
fn file_handles_follow_path_changes() {
    let a = GuppyFileBuilder::new(2).scalar("m", vec![1u32, 2]).write_temp();
    let b = GuppyFileBuilder::new(3).scalar("m", vec![7u32, 8, 9]).write_temp();

    for reuse in [true, false] {
        let reader = Reader::new(ReaderConfig::new(1).with_file_reuse(reuse)).unwrap();
        let mut first = vec![0u32; 2];
        let mut second = vec![0u32; 3];

        reader
            .read_var(a.path(), "m", WorkerSelector::Pinned(0), OutputBuffer::from(&mut first))
            .unwrap();
        reader
            .read_var(b.path(), "m", WorkerSelector::Pinned(0), OutputBuffer::from(&mut second))
            .unwrap();

        assert_eq!(first, [1, 2]);
        assert_eq!(second, [7, 8, 9]);
    }
}

#[test]
fn replaced_file_is_read_fresh_by_every_selector() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snap.gup");
    let staged = dir.path().join("snap.gup.tmp");
    let reader = reader(1);

    let old = GuppyFileBuilder::new(3).scalar("m", vec![1u32, 2, 3]).build();
    let new = GuppyFileBuilder::new(3).scalar("m", vec![7u32, 8, 9]).build();

    std::fs::write(&path, old).unwrap();
    let mut before = vec![0u32; 3];
    reader
        .read_var(&path, "m", WorkerSelector::Pinned(0), OutputBuffer::from(&mut before))
        .unwrap();
    assert_eq!(before, [1, 2, 3]);

    std::fs::write(&staged, new).unwrap();
    std::fs::rename(&staged, &path).unwrap();

    let mut pinned = vec![0u32; 3];
    let mut private = vec![0u32; 3];
    reader
        .read_var(&path, "m", WorkerSelector::Pinned(0), OutputBuffer::from(&mut pinned))
        .unwrap();
    reader
        .read_var(&path, "m", WorkerSelector::Private, OutputBuffer::from(&mut private))
        .unwrap();
    assert_eq!(pinned, [7, 8, 9]);
    assert_eq!(private, pinned);
}

#[test]
fn config_from_json() {
    let config: ReaderConfig = serde_json::from_str(r#"{"workers": 3}"#).unwrap();
    assert_eq!(config, ReaderConfig::new(3));

    let json = serde_json::to_string(&config).unwrap();
    let back: ReaderConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    let reader = Reader::new(back).unwrap();
    assert_eq!(reader.pool().len(), 3);
}

// --- Properties ---

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn ids_follow_offset(n in 0usize..200, id_offset in 0u64..(1 << 40)) {
            let file = particle_fixture(n).id_offset(id_offset).write_temp();
            let reader = reader(1);

            let mut ids = vec![0u64; n];
            reader
                .read_var(file.path(), "id", WorkerSelector::Auto, OutputBuffer::from(&mut ids))
                .unwrap();
            for (i, id) in ids.iter().enumerate() {
                prop_assert_eq!(*id, id_offset + i as u64);
            }
        }

        #[test]
        fn components_project_vectors(n in 1usize..200, k in 0usize..3) {
            let file = particle_fixture(n).write_temp();
            let reader = reader(1);

            let mut whole = vec![[0.0f32; 3]; n];
            let mut single = vec![0.0f32; n];
            reader
                .read_var(file.path(), "x", WorkerSelector::Auto, OutputBuffer::from(&mut whole))
                .unwrap();
            reader
                .read_var(
                    file.path(),
                    &format!("x[{k}]"),
                    WorkerSelector::Auto,
                    OutputBuffer::from(&mut single),
                )
                .unwrap();

            let projected: Vec<f32> = whole.iter().map(|p| p[k]).collect();
            prop_assert_eq!(single, projected);
        }
    }
}
