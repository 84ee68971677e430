//! Saving and loading sessions.
//!
//! ```text
//! capture.scopesession                 session document
//! capture_data/
//!   scope_1_metadata.yml               per-instrument event metadata
//!   scope_1_waveforms/
//!     waveform_3/
//!       channel_0.bin                  stream 0
//!       channel_2_stream1.bin          stream 1
//! ```
//!
//! Instrument ids in file names are session document ids, not positions.
//! Loading is tolerant: a bad metadata file, a missing body or an unknown
//! format tag skips that piece and the rest of the session still loads.

use super::context::SessionContext;
use super::document::{ChannelEntry, DecodeEntry, InputEntry, InstrumentEntry, SessionDocument};
use super::history::CapturedEvent;
use super::identity::{IdTable, SessionObject};
use super::metadata::{ChannelMetadata, EventMetadata, InstrumentMetadata};
use crate::codec::{self, WaveformFormat};
use crate::error::{Result, ResultExt, ScopeError};
use crate::types::{ChannelRef, InstrumentId, SampleKind, StreamDescriptor, Waveform, WaveformTiming};
use crossbeam_channel::RecvTimeoutError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File locations for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub document: PathBuf,
    pub data_dir: PathBuf,
}

impl SessionPaths {
    /// Paths for a session document; the data directory sits next to it
    pub fn new(document: impl AsRef<Path>) -> Self {
        let document = document.as_ref().to_path_buf();
        let stem = document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        let data_dir = document.with_file_name(format!("{}_data", stem));
        Self { document, data_dir }
    }

    pub fn metadata(&self, instrument: u32) -> PathBuf {
        self.data_dir
            .join(format!("scope_{}_metadata.yml", instrument))
    }

    pub fn event_dir(&self, instrument: u32, event: u64) -> PathBuf {
        self.data_dir
            .join(format!("scope_{}_waveforms", instrument))
            .join(format!("waveform_{}", event))
    }

    /// Body file; stream 0 keeps the suffix-free name older sessions used
    pub fn body(&self, instrument: u32, event: u64, channel: usize, stream: usize) -> PathBuf {
        let name = if stream == 0 {
            format!("channel_{}.bin", channel)
        } else {
            format!("channel_{}_stream{}.bin", channel, stream)
        };
        self.event_dir(instrument, event).join(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub instruments: usize,
    pub filters: usize,
    pub events: usize,
    pub streams: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub instruments: usize,
    pub filters: usize,
    pub events: usize,
    pub streams_loaded: usize,
    pub streams_skipped: usize,
    /// Event installed as the current data
    pub current_event: Option<u64>,
}

/// Write the session document and every retained waveform event.
///
/// Dense-packed waveforms are written `densev1`; everything else uses the
/// configured default format.
pub fn save_session(path: impl AsRef<Path>, ctx: &SessionContext) -> Result<SaveSummary> {
    save_session_as(path, ctx, None)
}

/// Like [`save_session`], but with `format` every body is written in that
/// format. Forcing `densev1` discards the timing of sparse captures.
pub fn save_session_as(
    path: impl AsRef<Path>,
    ctx: &SessionContext,
    format: Option<WaveformFormat>,
) -> Result<SaveSummary> {
    let paths = SessionPaths::new(path);
    let _guard = ctx.lock();
    let mut table = IdTable::new();
    let mut summary = SaveSummary::default();

    let doc = build_document(ctx, &mut table);
    summary.instruments = doc.instruments.len();
    summary.filters = doc.decodes.len();

    if let Some(parent) = paths.document.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&paths.document, doc.to_yaml()?)
        .map_err(ScopeError::Io)
        .with_context(|| format!("Failed to write session document {:?}", paths.document))?;

    std::fs::create_dir_all(&paths.data_dir)?;
    remove_stale_instrument_dirs(&paths.data_dir)?;

    let history = ctx.history();
    let default_format = ctx.config().default_format;
    for (position, entry) in doc.instruments.iter().enumerate() {
        let instrument = InstrumentId(position as u32);
        let mut metadata = InstrumentMetadata::default();

        for event in history.iter() {
            let mut em = EventMetadata::new(event.id, event.timestamp, event.femtoseconds);
            for (desc, waveform) in &event.streams {
                let ChannelRef::Instrument {
                    instrument: owner,
                    channel,
                } = desc.channel
                else {
                    continue;
                };
                if owner != instrument {
                    continue;
                }

                let format = format
                    .unwrap_or_else(|| codec::preferred_format(waveform, default_format));
                std::fs::create_dir_all(paths.event_dir(entry.id, event.id))?;
                codec::encode_file(
                    paths.body(entry.id, event.id, channel, desc.stream),
                    waveform,
                    format,
                )?;
                em.add_channel(ChannelMetadata::new(channel, desc.stream, &waveform.timing, format));
                summary.streams += 1;
            }
            if !em.channels.is_empty() {
                metadata.insert(em);
            }
        }

        std::fs::write(paths.metadata(entry.id), metadata.to_yaml()?)?;
    }
    summary.events = history.len();

    tracing::info!(
        "Saved session {:?}: {} instrument(s), {} filter(s), {} event(s), {} stream(s)",
        paths.document,
        summary.instruments,
        summary.filters,
        summary.events,
        summary.streams
    );
    Ok(summary)
}

fn build_document(ctx: &SessionContext, table: &mut IdTable) -> SessionDocument {
    let mut doc = SessionDocument::default();

    for (position, info) in ctx.instruments().into_iter().enumerate() {
        let instrument = InstrumentId(position as u32);
        let id = table.id_of(SessionObject::Instrument(instrument));
        let channels = info
            .channels
            .iter()
            .map(|c| ChannelEntry {
                id: table.id_of(SessionObject::Channel {
                    instrument,
                    index: c.index,
                }),
                index: c.index,
                name: c.name.clone(),
                kind: c.kind,
                streams: c.streams,
            })
            .collect();
        doc.instruments.push(InstrumentEntry {
            id,
            nickname: info.nickname,
            name: info.name,
            vendor: info.vendor,
            serial: info.serial,
            channels,
        });
    }

    // Every filter needs an id before any input can reference it
    let instances = ctx.filters().all_instances();
    for inst in &instances {
        table.id_of(SessionObject::Filter(inst.lock().id()));
    }

    for inst in &instances {
        let inst = inst.lock();
        let mut inputs = BTreeMap::new();
        for (name, input) in inst.input_names().iter().zip(inst.inputs()) {
            let Some(stream) = input else { continue };
            let owner = match stream.channel {
                ChannelRef::Instrument {
                    instrument,
                    channel,
                } => SessionObject::Channel {
                    instrument,
                    index: channel,
                },
                ChannelRef::Filter(f) => SessionObject::Filter(f),
            };
            match table.lookup(&owner) {
                Some(channel) => {
                    inputs.insert(
                        name.to_string(),
                        InputEntry {
                            channel,
                            stream: stream.stream,
                        },
                    );
                }
                None => tracing::debug!(
                    "{}: input {} refers to {} which is not in the session, not saved",
                    inst.nickname(),
                    name,
                    stream
                ),
            }
        }

        doc.decodes.push(DecodeEntry {
            id: table.id_of(SessionObject::Filter(inst.id())),
            protocol: inst.protocol().to_string(),
            nickname: inst.nickname().to_string(),
            parameters: inst.parameters(),
            inputs,
        });
    }

    doc.ui_config = ctx.ui_config();
    doc
}

fn remove_stale_instrument_dirs(data_dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with("scope_") {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Replace the contents of `ctx` with a saved session.
///
/// Instruments come back as descriptions only; pair them with
/// [`SessionContext::offline_instruments`] (or reconnect real drivers).
/// `progress` receives a fraction in `0.0..=1.0` and a status line.
pub fn load_session(
    path: impl AsRef<Path>,
    ctx: &SessionContext,
    mut progress: impl FnMut(f32, &str),
) -> Result<LoadReport> {
    let paths = SessionPaths::new(path);
    let content = std::fs::read_to_string(&paths.document)
        .map_err(ScopeError::Io)
        .with_context(|| format!("Failed to read session document {:?}", paths.document))?;
    let doc = SessionDocument::from_yaml(&content)?;

    let _guard = ctx.lock();
    ctx.close();
    progress(0.0, "Loading configuration");

    let mut table = IdTable::new();
    let mut report = LoadReport::default();

    load_instruments(&doc, ctx, &mut table);
    report.instruments = doc.instruments.len();
    report.filters = load_decodes(&doc, ctx, &mut table);
    ctx.set_ui_config(doc.ui_config.clone());

    let mut events: BTreeMap<u64, CapturedEvent> = BTreeMap::new();
    let per_instrument = 1.0 / doc.instruments.len().max(1) as f32;
    for (position, entry) in doc.instruments.iter().enumerate() {
        let base = position as f32 * per_instrument;
        load_instrument_waveforms(
            &paths,
            ctx,
            InstrumentId(position as u32),
            entry,
            &mut events,
            &mut report,
            base,
            per_instrument,
            &mut progress,
        );
    }

    {
        let mut history = ctx.history();
        if events.len() > history.depth() {
            history.set_depth(events.len());
        }
        for event in events.into_values() {
            let streams = event.streams.len();
            match history.insert(event) {
                Ok(()) => report.events += 1,
                Err(e) => {
                    tracing::warn!("Dropping event: {}", e);
                    report.streams_loaded -= streams;
                    report.streams_skipped += streams;
                }
            }
        }
    }

    let newest = ctx.history().newest().cloned();
    if let Some(event) = newest {
        ctx.install_event(&event);
        report.current_event = Some(event.id);
    }

    if let Err(e) = ctx.refresh_all_filters() {
        tracing::warn!("Filters not evaluated after load: {}", e);
    }
    progress(1.0, "Done");

    tracing::info!(
        "Loaded session {:?}: {} instrument(s), {} filter(s), {} event(s), {} stream(s), {} skipped",
        paths.document,
        report.instruments,
        report.filters,
        report.events,
        report.streams_loaded,
        report.streams_skipped
    );
    Ok(report)
}

fn load_instruments(doc: &SessionDocument, ctx: &SessionContext, table: &mut IdTable) {
    let mut infos = Vec::with_capacity(doc.instruments.len());
    for (position, entry) in doc.instruments.iter().enumerate() {
        let instrument = InstrumentId(position as u32);
        if let Err(e) = table.bind(entry.id, SessionObject::Instrument(instrument)) {
            tracing::warn!("Instrument {}: {}", entry.nickname, e);
        }
        for ch in &entry.channels {
            let object = SessionObject::Channel {
                instrument,
                index: ch.index,
            };
            if let Err(e) = table.bind(ch.id, object) {
                tracing::warn!("Instrument {} channel {}: {}", entry.nickname, ch.index, e);
            }
        }
        infos.push(entry.to_info());
    }
    ctx.set_instruments(infos);
}

/// Instantiate every decode, then wire inputs once all of them exist.
/// Returns the number of filters created.
fn load_decodes(doc: &SessionDocument, ctx: &SessionContext, table: &mut IdTable) -> usize {
    let registry = ctx.filters();
    let mut created = 0;

    for decode in &doc.decodes {
        let nickname = (!decode.nickname.is_empty()).then_some(decode.nickname.as_str());
        let id = match registry.create(&decode.protocol, nickname) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("{}, skipping decode {}", e, decode.id);
                continue;
            }
        };
        if let Err(e) = table.bind(decode.id, SessionObject::Filter(id)) {
            tracing::warn!("Decode {}: {}", decode.id, e);
        }
        created += 1;

        if let Some(inst) = registry.instance(id) {
            let mut inst = inst.lock();
            for (name, value) in &decode.parameters {
                if let Err(e) = inst.set_parameter(name, *value) {
                    tracing::warn!("{}: {}", inst.nickname(), e);
                }
            }
        }
    }

    // Decodes are not saved in dependency order, so inputs go in a second pass
    for decode in &doc.decodes {
        let Some(inst) = table.filter(decode.id).and_then(|id| registry.instance(id)) else {
            continue;
        };
        let mut inst = inst.lock();
        for (name, input) in &decode.inputs {
            let Some(index) = inst.input_names().iter().position(|n| *n == name.as_str()) else {
                tracing::warn!("{} has no input named {:?}", inst.nickname(), name);
                continue;
            };
            let stream = match table.object_of(input.channel) {
                Some(SessionObject::Channel { instrument, index }) => {
                    StreamDescriptor::instrument(instrument, index, input.stream)
                }
                Some(SessionObject::Filter(f)) => StreamDescriptor::filter(f, input.stream),
                _ => {
                    tracing::warn!(
                        "{}: {}, input {} left unconnected",
                        inst.nickname(),
                        ScopeError::UnresolvedReference(input.channel),
                        name
                    );
                    continue;
                }
            };
            if let Err(e) = inst.set_input(index, Some(stream)) {
                tracing::warn!("{}", e);
            }
        }
    }

    created
}

struct BodyJob {
    stream: StreamDescriptor,
    path: PathBuf,
    format: WaveformFormat,
    kind: SampleKind,
    timing: WaveformTiming,
}

#[allow(clippy::too_many_arguments)]
fn load_instrument_waveforms(
    paths: &SessionPaths,
    ctx: &SessionContext,
    instrument: InstrumentId,
    entry: &InstrumentEntry,
    events: &mut BTreeMap<u64, CapturedEvent>,
    report: &mut LoadReport,
    base: f32,
    range: f32,
    progress: &mut dyn FnMut(f32, &str),
) {
    let metadata_path = paths.metadata(entry.id);
    if !metadata_path.exists() {
        tracing::debug!("No waveform metadata for {}", entry.nickname);
        return;
    }
    let metadata = match std::fs::read_to_string(&metadata_path)
        .map_err(ScopeError::Io)
        .and_then(|s| InstrumentMetadata::from_yaml(&s))
    {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Skipping waveforms of {}: {:?}: {}", entry.nickname, metadata_path, e);
            return;
        }
    };

    let info = entry.to_info();
    let interval = ctx.config().progress_interval;
    let per_event = range / metadata.waveforms.len().max(1) as f32;

    for (n, em) in metadata.waveforms.values().enumerate() {
        let event_base = base + n as f32 * per_event;
        let femtoseconds = match em.femtoseconds() {
            Ok(fs) => fs,
            Err(e) => {
                tracing::warn!("{}: {}", entry.nickname, e);
                report.streams_skipped += em.channels.len();
                continue;
            }
        };

        let mut jobs = Vec::with_capacity(em.channels.len());
        for ch in em.channels.values() {
            let format = match ch.format() {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(
                        "{} channel {} waveform {}: {}, skipping",
                        entry.nickname,
                        ch.index,
                        em.id,
                        e
                    );
                    report.streams_skipped += 1;
                    continue;
                }
            };
            let timing = match em.timing(ch) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(
                        "{} channel {} waveform {}: {}, skipping",
                        entry.nickname,
                        ch.index,
                        em.id,
                        e
                    );
                    report.streams_skipped += 1;
                    continue;
                }
            };
            let kind = info.channel(ch.index).map(|c| c.kind).unwrap_or_else(|| {
                tracing::warn!("{} has no channel {}, assuming analog", entry.nickname, ch.index);
                SampleKind::Analog
            });
            jobs.push(BodyJob {
                stream: StreamDescriptor::instrument(instrument, ch.index, ch.stream),
                path: paths.body(entry.id, em.id, ch.index, ch.stream),
                format,
                kind,
                timing,
            });
        }

        let message = format!("Loading waveform {} of {}", em.id, entry.nickname);
        let results = load_bodies(&jobs, interval, |frac| {
            progress(event_base + frac * per_event, &message)
        });

        let event = events.entry(em.id).or_insert_with(|| CapturedEvent {
            id: em.id,
            timestamp: em.timestamp,
            femtoseconds,
            streams: BTreeMap::new(),
        });
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(waveform) => {
                    event.streams.insert(job.stream, Arc::new(waveform));
                    report.streams_loaded += 1;
                }
                Err(e) => {
                    tracing::error!("Skipping {}: {}", job.stream, e);
                    report.streams_skipped += 1;
                }
            }
        }
    }
}

/// Decode every body on its own thread, reporting aggregate progress every
/// `interval` until all have finished. Results come back in job order.
fn load_bodies(
    jobs: &[BodyJob],
    interval: Duration,
    mut progress: impl FnMut(f32),
) -> Vec<Result<Waveform>> {
    let total = jobs.len();
    let mut slots: Vec<Option<Result<Waveform>>> = (0..total).map(|_| None).collect();
    let (tx, rx) = crossbeam_channel::unbounded();

    std::thread::scope(|s| {
        for (slot, job) in jobs.iter().enumerate() {
            let tx = tx.clone();
            s.spawn(move || {
                let result = codec::decode_file(&job.path, job.format, job.kind, job.timing);
                // Receiver outlives every worker inside the scope
                let _ = tx.send((slot, result));
            });
        }
        drop(tx);

        let mut done = 0;
        while done < total {
            match rx.recv_timeout(interval) {
                Ok((slot, result)) => {
                    slots[slot] = Some(result);
                    done += 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            progress(done as f32 / total as f32);
        }
    });

    slots
        .into_iter()
        .map(|r| {
            r.unwrap_or_else(|| Err(ScopeError::Channel("body loader exited without a result".into())))
        })
        .collect()
}
