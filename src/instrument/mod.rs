//! Instrument capability.
//!
//! The core never speaks an instrument's wire protocol. It drives every
//! instrument through the [`Instrument`] trait: arm, stop, poll for pending
//! captures and pop them. Real drivers live outside this crate; the crate
//! ships [`OfflineInstrument`] (a placeholder for an instrument recorded in
//! a loaded session) and [`MockInstrument`] for demos and tests.

mod mock;
mod offline;

pub use mock::{
    CommandLog, InstrumentCommand, MockInstrument, MockInstrumentHandle, MockPattern,
};
pub use offline::OfflineInstrument;

use crate::error::Result;
use crate::types::{SampleKind, Waveform};
use serde::{Deserialize, Serialize};

/// Static description of one instrument channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub index: usize,
    pub name: String,
    #[serde(default)]
    pub kind: SampleKind,
    /// Number of logical streams the channel emits
    #[serde(default = "default_streams")]
    pub streams: usize,
}

fn default_streams() -> usize {
    1
}

impl ChannelInfo {
    pub fn new(index: usize, name: impl Into<String>, kind: SampleKind) -> Self {
        Self {
            index,
            name: name.into(),
            kind,
            streams: 1,
        }
    }
}

/// Static description of an instrument
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub nickname: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
}

impl InstrumentInfo {
    pub fn channel(&self, index: usize) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.index == index)
    }
}

/// One stream of a completed capture
#[derive(Debug, Clone)]
pub struct CapturedStream {
    pub channel: usize,
    pub stream: usize,
    pub waveform: Waveform,
}

/// Everything one instrument captured for one trigger event
#[derive(Debug, Clone, Default)]
pub struct PendingCapture {
    pub streams: Vec<CapturedStream>,
}

impl PendingCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, channel: usize, stream: usize, waveform: Waveform) -> Self {
        self.streams.push(CapturedStream {
            channel,
            stream,
            waveform,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Abstract instrument driven by the trigger coordinator.
///
/// Implementations are polled from the acquisition thread only, so methods
/// take `&mut self` and need not be internally synchronized.
pub trait Instrument: Send {
    fn info(&self) -> InstrumentInfo;

    /// Stable, human-facing identifier used in logs and session documents
    fn nickname(&self) -> String;

    /// True for instruments restored from a file with no live connection
    fn is_offline(&self) -> bool;

    fn has_pending_waveforms(&mut self) -> bool;

    /// Whether the instrument reports its trigger as armed right now
    fn peek_trigger_armed(&mut self) -> bool;

    /// Arm in repeating (normal) mode
    fn start(&mut self) -> Result<()>;

    /// Arm for exactly one capture
    fn start_single_trigger(&mut self) -> Result<()>;

    /// Capture immediately, ignoring the trigger condition
    fn force_trigger(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Discard captured data nobody asked for
    fn clear_pending_waveforms(&mut self);

    fn pop_pending_waveform(&mut self) -> Option<PendingCapture>;
}
