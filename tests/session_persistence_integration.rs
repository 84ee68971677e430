//! Integration tests for session save and load
//!
//! These tests validate the on-disk session layout end to end:
//! - Round trip of instruments, filters and waveform history
//! - Legacy picosecond metadata
//! - Tolerant loading of damaged sessions

mod common;

use common::builders::{absorb_event, WaveformBuilder};
use scopecore::codec::WaveformFormat;
use scopecore::instrument::{Instrument, MockInstrument};
use scopecore::session::{
    load_session, save_session, save_session_as, InstrumentMetadata, SessionContext, SessionPaths,
};
use scopecore::types::{ChannelRef, InstrumentId, StreamDescriptor};
use std::path::Path;

fn ch(instrument: u32, channel: usize) -> StreamDescriptor {
    StreamDescriptor::instrument(InstrumentId(instrument), channel, 0)
}

/// Two instruments, Scale on scope0/ch0 and Subtract(Scale, scope1/ch0),
/// one dense and one sparse event
fn populated_session() -> SessionContext {
    let ctx = SessionContext::default();
    ctx.set_instruments(vec![
        MockInstrument::new("left", 2).info(),
        MockInstrument::new("right", 1).info(),
    ]);

    let filters = ctx.filters();
    let scale = filters.create("Scale", Some("gain")).unwrap();
    {
        let inst = filters.instance(scale).unwrap();
        let mut inst = inst.lock();
        inst.set_input(0, Some(ch(0, 0))).unwrap();
        inst.set_parameter("gain", 3.0).unwrap();
    }
    let diff = filters.create("Subtract", None).unwrap();
    {
        let inst = filters.instance(diff).unwrap();
        let mut inst = inst.lock();
        inst.set_input(0, Some(StreamDescriptor::filter(scale, 0))).unwrap();
        inst.set_input(1, Some(ch(1, 0))).unwrap();
    }

    absorb_event(
        &ctx,
        vec![
            (0, 0, WaveformBuilder::ramp(4, 0.0).start(100, 0).build()),
            (0, 1, WaveformBuilder::ramp(4, 10.0).start(100, 0).build()),
            (1, 0, WaveformBuilder::ramp(4, 1.0).start(100, 0).build()),
        ],
    );
    absorb_event(
        &ctx,
        vec![
            (
                0,
                0,
                WaveformBuilder::new(&[1.0, 2.0, 3.0])
                    .offsets(&[0, 4, 9])
                    .start(200, 5)
                    .trigger_phase(-120)
                    .build(),
            ),
            (1, 0, WaveformBuilder::new(&[0.5, 0.5, 0.5]).start(200, 5).build()),
        ],
    );
    ctx.refresh_all_filters().unwrap();
    ctx
}

#[test]
fn test_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.scopesession");

    let original = populated_session();
    original.set_ui_config(serde_yaml::from_str("zoom: 2.5").unwrap());
    let summary = save_session(&path, &original).unwrap();
    assert_eq!(summary.instruments, 2);
    assert_eq!(summary.filters, 2);
    assert_eq!(summary.events, 2);
    assert_eq!(summary.streams, 5);

    let loaded = SessionContext::default();
    let mut progress = Vec::new();
    let report = load_session(&path, &loaded, |f, _| progress.push(f)).unwrap();

    assert_eq!(report.instruments, 2);
    assert_eq!(report.filters, 2);
    assert_eq!(report.events, 2);
    assert_eq!(report.streams_loaded, 5);
    assert_eq!(report.streams_skipped, 0);
    assert_eq!(report.current_event, Some(2));
    assert_eq!(progress.first().copied(), Some(0.0));
    assert_eq!(progress.last().copied(), Some(1.0));

    let infos = loaded.instruments();
    assert_eq!(infos[0].nickname, "left");
    assert_eq!(infos[1].channels.len(), 1);
    assert_eq!(loaded.ui_config()["zoom"].as_f64(), Some(2.5));
    assert_eq!(loaded.history().ids(), vec![1, 2]);

    // The newest event is current, sparse timing intact
    let current = loaded.store().get(&ch(0, 0)).unwrap();
    assert_eq!(current.offsets(), &[0, 4, 9]);
    assert_eq!(current.timing.trigger_phase, -120);
    assert_eq!(current.timing.start_timestamp, 200);
    assert!(!loaded.store().contains(&ch(0, 1)));

    // Filters were rebuilt, rewired and re-evaluated
    let instances = loaded.filters().all_instances();
    let protocols: Vec<String> = instances
        .iter()
        .map(|i| i.lock().protocol().to_string())
        .collect();
    assert_eq!(protocols, vec!["Scale", "Subtract"]);

    let scale = instances[0].lock();
    assert_eq!(scale.nickname(), "gain");
    assert_eq!(scale.parameters()["gain"], 3.0);
    let diff = instances[1].lock();
    assert_eq!(diff.inputs()[0], Some(StreamDescriptor::filter(scale.id(), 0)));
    assert_eq!(diff.inputs()[1], Some(ch(1, 0)));

    let out = loaded
        .store()
        .get(&StreamDescriptor::filter(diff.id(), 0))
        .unwrap();
    assert_eq!(out.samples().as_analog().unwrap(), &[2.5, 5.5, 8.5]);

    // Older events are still selectable
    drop(scale);
    drop(diff);
    assert!(loaded.select_history(1));
    assert_eq!(loaded.store().get(&ch(0, 1)).unwrap().len(), 4);
}

#[test]
fn test_formats_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fmt.scopesession");
    save_session(&path, &populated_session()).unwrap();

    let paths = SessionPaths::new(&path);
    let meta = InstrumentMetadata::from_yaml(
        &std::fs::read_to_string(paths.metadata(1)).unwrap(),
    )
    .unwrap();
    let dense = &meta.waveforms["wfm1"].channels["ch0"];
    let sparse = &meta.waveforms["wfm2"].channels["ch0"];
    assert_eq!(dense.format().unwrap(), WaveformFormat::DenseV1);
    assert_eq!(sparse.format().unwrap(), WaveformFormat::SparseV1);

    // 4 f32 values; 3 records of 8 + 8 + 4 bytes
    assert_eq!(std::fs::metadata(paths.body(1, 1, 0, 0)).unwrap().len(), 16);
    assert_eq!(std::fs::metadata(paths.body(1, 2, 0, 0)).unwrap().len(), 60);
}

#[test]
fn test_forced_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forced.scopesession");
    save_session_as(&path, &populated_session(), Some(WaveformFormat::SparseV1)).unwrap();

    let paths = SessionPaths::new(&path);
    let meta = InstrumentMetadata::from_yaml(
        &std::fs::read_to_string(paths.metadata(1)).unwrap(),
    )
    .unwrap();
    for event in meta.waveforms.values() {
        for channel in event.channels.values() {
            assert_eq!(channel.format().unwrap(), WaveformFormat::SparseV1);
        }
    }
}

#[test]
fn test_resave_removes_stale_instruments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resave.scopesession");
    let ctx = populated_session();
    save_session(&path, &ctx).unwrap();

    let paths = SessionPaths::new(&path);
    assert!(paths.metadata(4).exists());

    ctx.close();
    ctx.set_instruments(vec![MockInstrument::new("only", 1).info()]);
    absorb_event(&ctx, vec![(0, 0, WaveformBuilder::ramp(2, 0.0).build())]);
    save_session(&path, &ctx).unwrap();

    assert!(paths.metadata(1).exists());
    assert!(!paths.metadata(4).exists());
    assert!(!paths.data_dir.join("scope_4_waveforms").exists());
}

fn write(path: &Path, content: impl AsRef<[u8]>) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn sparse_body(records: &[(i64, i64, f32)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (off, dur, v) in records {
        out.extend_from_slice(&off.to_le_bytes());
        out.extend_from_slice(&dur.to_le_bytes());
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

const OLD_DOCUMENT: &str = r#"
instruments:
  - id: 1
    nickname: old
    name: DSO
    channels:
      - id: 2
        index: 0
        name: CH1
      - id: 3
        index: 1
        name: CH2
      - id: 4
        index: 2
        name: CH3
decodes:
  - id: 5
    protocol: Scale
    nickname: doubled
    parameters:
      gain: 2.0
    inputs:
      in:
        channel: 2
  - id: 6
    protocol: NoSuchDecoder
  - id: 7
    protocol: Invert
    inputs:
      in:
        channel: 99
"#;

#[test]
fn test_legacy_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.scopesession");
    let paths = SessionPaths::new(&path);

    write(&path, OLD_DOCUMENT);
    write(
        &paths.metadata(1),
        r#"
waveforms:
  wfm1:
    timestamp: 1500000000
    time_psec: 250
    id: 1
    channels:
      ch0:
        index: 0
        timescale: 50
        trigphase: 12.5
"#,
    );
    write(
        &paths.body(1, 1, 0, 0),
        sparse_body(&[(0, 1, 1.0), (1, 1, -1.0)]),
    );

    let ctx = SessionContext::default();
    let report = load_session(&path, &ctx, |_, _| {}).unwrap();

    // The unknown protocol is skipped, the dangling input left open
    assert_eq!(report.filters, 2);
    assert_eq!(report.streams_loaded, 1);

    let wfm = ctx.store().get(&ch(0, 0)).unwrap();
    assert_eq!(wfm.timing.timescale, 50_000);
    assert_eq!(wfm.timing.trigger_phase, 12_500);
    assert_eq!(wfm.timing.start_timestamp, 1_500_000_000);
    assert_eq!(wfm.timing.start_femtoseconds, 250_000);
    assert!(wfm.dense_packed());

    let instances = ctx.filters().all_instances();
    let scale = instances[0].lock();
    assert_eq!(scale.nickname(), "doubled");
    assert_eq!(scale.inputs()[0], Some(ch(0, 0)));
    let out = ctx
        .store()
        .get(&StreamDescriptor::filter(scale.id(), 0))
        .unwrap();
    assert_eq!(out.samples().as_analog().unwrap(), &[2.0, -2.0]);

    let invert = instances[1].lock();
    assert_eq!(invert.protocol(), "Invert");
    assert_eq!(invert.inputs()[0], None);
}

#[test]
fn test_damaged_streams_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("damaged.scopesession");
    let paths = SessionPaths::new(&path);

    write(&path, OLD_DOCUMENT);
    write(
        &paths.metadata(1),
        r#"
waveforms:
  wfm4:
    timestamp: 10
    time_fsec: 0
    id: 4
    channels:
      ch0:
        index: 0
        timescale: 1000
        trigphase: 0
        format: densev1
      ch1:
        index: 1
        timescale: 1000
        trigphase: 0
      ch2:
        index: 2
        timescale: 1000
        trigphase: 0
        format: hdf5v9
"#,
    );
    // ch1 has no body file at all
    write(&paths.body(1, 4, 0, 0), 3.0f32.to_le_bytes());
    write(&paths.body(1, 4, 2, 0), 3.0f32.to_le_bytes());

    let ctx = SessionContext::default();
    let report = load_session(&path, &ctx, |_, _| {}).unwrap();

    assert_eq!(report.streams_loaded, 1);
    assert_eq!(report.streams_skipped, 2);
    assert_eq!(report.current_event, Some(4));
    assert!(ctx.store().contains(&ch(0, 0)));
    assert!(!ctx.store().contains(&ch(0, 1)));
    assert!(!ctx.store().contains(&ch(0, 2)));
}

#[test]
fn test_load_replaces_existing_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replace.scopesession");
    write(&path, "instruments: []\n");

    let ctx = populated_session();
    let report = load_session(&path, &ctx, |_, _| {}).unwrap();
    assert_eq!(report.instruments, 0);
    assert!(ctx.instruments().is_empty());
    assert!(ctx.filters().is_empty());
    assert!(ctx.history().is_empty());
    assert!(ctx
        .store()
        .streams()
        .iter()
        .all(|s| !matches!(s.channel, ChannelRef::Instrument { .. })));
}

#[test]
fn test_missing_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = SessionContext::default();
    assert!(load_session(dir.path().join("absent.scopesession"), &ctx, |_, _| {}).is_err());
}

const SINGLE_CHANNEL_DOCUMENT: &str = r#"
instruments:
  - id: 1
    nickname: solo
    name: DSO
    channels:
      - id: 2
        index: 0
        name: CH1
"#;

#[test]
fn test_out_of_range_instrument_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge_id.scopesession");
    write(
        &path,
        r#"
instruments:
  - id: 4294967295
    nickname: huge
    name: DSO
    channels:
      - id: 2
        index: 0
        name: CH1
"#,
    );

    let ctx = SessionContext::default();
    let report = load_session(&path, &ctx, |_, _| {}).unwrap();
    assert_eq!(report.instruments, 1);
    assert_eq!(ctx.instruments()[0].nickname, "huge");
    assert_eq!(report.events, 0);
}

#[test]
fn test_out_of_range_event_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge_event.scopesession");
    let paths = SessionPaths::new(&path);

    write(&path, SINGLE_CHANNEL_DOCUMENT);
    write(
        &paths.metadata(1),
        r#"
waveforms:
  wfm18446744073709551615:
    timestamp: 10
    time_fsec: 0
    id: 18446744073709551615
    channels:
      ch0:
        index: 0
        timescale: 1000
        trigphase: 0
        format: densev1
"#,
    );
    write(&paths.body(1, u64::MAX, 0, 0), 3.0f32.to_le_bytes());

    let ctx = SessionContext::default();
    let report = load_session(&path, &ctx, |_, _| {}).unwrap();
    assert_eq!(report.events, 0);
    assert_eq!(report.streams_loaded, 0);
    assert_eq!(report.streams_skipped, 1);
    assert_eq!(report.current_event, None);
    assert!(ctx.history().is_empty());
    assert!(!ctx.store().contains(&ch(0, 0)));
}

#[test]
fn test_out_of_range_legacy_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge_time.scopesession");
    let paths = SessionPaths::new(&path);

    write(&path, SINGLE_CHANNEL_DOCUMENT);
    write(
        &paths.metadata(1),
        r#"
waveforms:
  wfm1:
    timestamp: 10
    time_psec: 9223372036854775807
    id: 1
    channels:
      ch0:
        index: 0
        timescale: 50
        trigphase: 0
  wfm2:
    timestamp: 11
    time_psec: 0
    id: 2
    channels:
      ch0:
        index: 0
        timescale: 9223372036854775807
        trigphase: 0
"#,
    );
    write(&paths.body(1, 1, 0, 0), sparse_body(&[(0, 1, 1.0)]));
    write(&paths.body(1, 2, 0, 0), sparse_body(&[(0, 1, 1.0)]));

    let ctx = SessionContext::default();
    let report = load_session(&path, &ctx, |_, _| {}).unwrap();
    assert_eq!(report.streams_loaded, 0);
    assert_eq!(report.streams_skipped, 2);
    assert!(!ctx.store().contains(&ch(0, 0)));
}
