//! Integration tests for waveform body files
//!
//! These tests validate body decoding as the session loader sees it:
//! - Raw buffers in both layouts
//! - Truncation of partial trailing records
//! - Memory-mapped file decode

mod common;

use common::builders::WaveformBuilder;
use scopecore::codec::{self, WaveformFormat};
use scopecore::types::{SampleKind, Samples, Waveform, WaveformTiming};

fn sparse_record(offset: i64, duration: i64, value: f32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&duration.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
    out
}

#[test]
fn test_single_sample_with_trailing_padding() {
    let mut buf = sparse_record(0, 1, 1.5);
    buf.extend_from_slice(&[0u8; 4]);
    assert_eq!(buf.len(), 24);

    let wfm = codec::decode(
        WaveformFormat::SparseV1,
        SampleKind::Analog,
        WaveformTiming::new(1000),
        &buf,
    )
    .unwrap();

    assert_eq!(wfm.len(), 1);
    assert_eq!(wfm.samples().as_analog().unwrap()[0], 1.5);
    assert!(wfm.dense_packed());
}

#[test]
fn test_gap_is_not_dense() {
    let mut buf = sparse_record(0, 1, 1.0);
    buf.extend(sparse_record(3, 1, 2.0));

    let wfm = codec::decode(
        WaveformFormat::SparseV1,
        SampleKind::Analog,
        WaveformTiming::new(1000),
        &buf,
    )
    .unwrap();
    assert_eq!(wfm.offsets(), &[0, 3]);
    assert!(!wfm.dense_packed());
}

#[test]
fn test_digital_sparse_any_nonzero_is_true() {
    let mut buf = Vec::new();
    for (i, byte) in [0u8, 1, 0xff].iter().enumerate() {
        buf.extend_from_slice(&(i as i64).to_le_bytes());
        buf.extend_from_slice(&1i64.to_le_bytes());
        buf.push(*byte);
    }
    let wfm = codec::decode(
        WaveformFormat::SparseV1,
        SampleKind::Digital,
        WaveformTiming::new(1),
        &buf,
    )
    .unwrap();
    assert_eq!(wfm.samples().as_digital().unwrap(), &[false, true, true]);
}

#[test]
fn test_dense_reconstructs_timing() {
    let mut buf = Vec::new();
    for v in [0.5f32, -0.5, 2.0] {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.push(0x7f);

    let wfm = codec::decode(
        WaveformFormat::DenseV1,
        SampleKind::Analog,
        WaveformTiming::new(1000),
        &buf,
    )
    .unwrap();
    assert_eq!(wfm.offsets(), &[0, 1, 2]);
    assert_eq!(wfm.durations(), &[1, 1, 1]);
    assert!(wfm.dense_packed());
}

#[test]
fn test_file_decode_keeps_timing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("channel_0.bin");

    let original = WaveformBuilder::new(&[1.0, 2.0, 3.0])
        .offsets(&[0, 2, 10])
        .timescale(500)
        .build();
    codec::encode_file(&path, &original, WaveformFormat::SparseV1).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 60);

    let loaded = codec::decode_file(
        &path,
        WaveformFormat::SparseV1,
        SampleKind::Analog,
        original.timing,
    )
    .unwrap();
    assert_eq!(loaded, original);

    // The mapping is released; the file can go away
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = codec::decode_file(
        dir.path().join("nope.bin"),
        WaveformFormat::DenseV1,
        SampleKind::Analog,
        WaveformTiming::new(1),
    );
    assert!(result.is_err());
}

#[test]
fn test_empty_file_decodes_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.bin");
    std::fs::write(&path, b"").unwrap();

    let wfm = codec::decode_file(
        &path,
        WaveformFormat::SparseV1,
        SampleKind::Digital,
        WaveformTiming::new(1),
    )
    .unwrap();
    assert!(wfm.is_empty());
    assert_eq!(wfm.kind(), SampleKind::Digital);
}

#[test]
fn test_forced_dense_drops_sparse_timing() {
    let sparse = Waveform::sparse(
        WaveformTiming::new(1),
        vec![0, 5],
        vec![5, 5],
        Samples::Analog(vec![1.0, 2.0]),
    )
    .unwrap();
    assert_eq!(
        codec::preferred_format(&sparse, WaveformFormat::DenseV1),
        WaveformFormat::SparseV1
    );

    let bytes = codec::encode(&sparse, WaveformFormat::DenseV1);
    let back = codec::decode(WaveformFormat::DenseV1, SampleKind::Analog, sparse.timing, &bytes)
        .unwrap();
    assert_eq!(back.offsets(), &[0, 1]);
    assert_eq!(back.samples(), sparse.samples());
}
