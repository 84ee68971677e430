//! Core data types for scopecore
//!
//! This module contains the fundamental data structures shared by the
//! codec, the waveform store, the trigger coordinator and the filter graph.
//!
//! # Main Types
//!
//! - [`InstrumentId`] - Position of an instrument in the session instrument set
//! - [`ChannelRef`] - Either a physical instrument channel or a filter
//! - [`StreamDescriptor`] - `(channel, stream index)` key for all per-stream state
//! - [`Waveform`] - One stream's samples at one trigger instant
//! - [`Samples`] - Closed set of sample payloads (analog, digital)
//!
//! # Time Units
//!
//! Sample offsets and durations are stored in ticks; `timescale` converts a
//! tick to femtoseconds. The absolute start time is split into whole seconds
//! and a femtosecond remainder so long uptimes do not lose precision.

use crate::error::{Result, ScopeError};
use crate::filter::FilterId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Femtoseconds per second
pub const FS_PER_SECOND: i64 = 1_000_000_000_000_000;

/// Femtoseconds per picosecond (legacy metadata files use picoseconds)
pub const FS_PER_PS: i64 = 1000;

/// Index of an instrument in the session instrument set. Index 0 is the primary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InstrumentId(pub u32);

impl InstrumentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_primary(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstrumentId({})", self.0)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity of something that emits streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelRef {
    /// A physical channel on an instrument
    Instrument {
        instrument: InstrumentId,
        channel: usize,
    },
    /// The output of a filter instance
    Filter(FilterId),
}

impl ChannelRef {
    /// The filter behind this reference, if any
    pub fn as_filter(&self) -> Option<FilterId> {
        match self {
            ChannelRef::Filter(id) => Some(*id),
            ChannelRef::Instrument { .. } => None,
        }
    }

    /// The instrument behind this reference, if any
    pub fn instrument(&self) -> Option<InstrumentId> {
        match self {
            ChannelRef::Instrument { instrument, .. } => Some(*instrument),
            ChannelRef::Filter(_) => None,
        }
    }
}

/// Unique key for per-stream state: waveform slots, filter inputs, statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamDescriptor {
    pub channel: ChannelRef,
    pub stream: usize,
}

impl StreamDescriptor {
    pub fn new(channel: ChannelRef, stream: usize) -> Self {
        Self { channel, stream }
    }

    /// Stream of a physical instrument channel
    pub fn instrument(instrument: InstrumentId, channel: usize, stream: usize) -> Self {
        Self {
            channel: ChannelRef::Instrument {
                instrument,
                channel,
            },
            stream,
        }
    }

    /// Output stream of a filter
    pub fn filter(id: FilterId, stream: usize) -> Self {
        Self {
            channel: ChannelRef::Filter(id),
            stream,
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            ChannelRef::Instrument {
                instrument,
                channel,
            } => write!(f, "scope{}/ch{}", instrument.0, channel)?,
            ChannelRef::Filter(id) => write!(f, "filter{}", id.0)?,
        }
        if self.stream != 0 {
            write!(f, ".{}", self.stream)?;
        }
        Ok(())
    }
}

/// Sample payload type of a channel or stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// 32-bit float samples
    #[default]
    Analog,
    /// Boolean samples
    Digital,
}

impl SampleKind {
    /// Size in bytes of one stored value
    pub fn value_size(&self) -> usize {
        match self {
            SampleKind::Analog => std::mem::size_of::<f32>(),
            SampleKind::Digital => std::mem::size_of::<bool>(),
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Analog => write!(f, "analog"),
            SampleKind::Digital => write!(f, "digital"),
        }
    }
}

/// Sample values, parallel to the offset/duration arrays
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Analog(Vec<f32>),
    Digital(Vec<bool>),
}

impl Samples {
    /// Empty payload of the given kind
    pub fn empty(kind: SampleKind) -> Self {
        match kind {
            SampleKind::Analog => Samples::Analog(Vec::new()),
            SampleKind::Digital => Samples::Digital(Vec::new()),
        }
    }

    pub fn kind(&self) -> SampleKind {
        match self {
            Samples::Analog(_) => SampleKind::Analog,
            Samples::Digital(_) => SampleKind::Digital,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::Analog(v) => v.len(),
            Samples::Digital(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_analog(&self) -> Option<&[f32]> {
        match self {
            Samples::Analog(v) => Some(v),
            Samples::Digital(_) => None,
        }
    }

    pub fn as_digital(&self) -> Option<&[bool]> {
        match self {
            Samples::Digital(v) => Some(v),
            Samples::Analog(_) => None,
        }
    }
}

/// Timing metadata shared by every sample of a waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaveformTiming {
    /// Femtoseconds per offset/duration tick
    pub timescale: i64,
    /// Whole seconds of the capture start (Unix time)
    pub start_timestamp: i64,
    /// Sub-second remainder of the capture start, in femtoseconds
    pub start_femtoseconds: i64,
    /// Sub-sample trigger offset, in femtoseconds
    pub trigger_phase: i64,
}

impl WaveformTiming {
    pub fn new(timescale: i64) -> Self {
        Self {
            timescale,
            ..Default::default()
        }
    }

    /// Set the absolute start time
    pub fn with_start(mut self, seconds: i64, femtoseconds: i64) -> Self {
        self.start_timestamp = seconds;
        self.start_femtoseconds = femtoseconds;
        self
    }

    pub fn with_trigger_phase(mut self, phase: i64) -> Self {
        self.trigger_phase = phase;
        self
    }

    /// Start time stamped from the wall clock
    pub fn stamped_now(mut self) -> Self {
        let now = chrono::Utc::now();
        self.start_timestamp = now.timestamp();
        self.start_femtoseconds = now.timestamp_subsec_nanos() as i64 * 1_000_000;
        self
    }
}

/// Cheap summary of a waveform, used by the analysis cache
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformSummary {
    pub len: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// The sampled signal for one stream at one trigger instant.
///
/// Offsets are monotonically non-decreasing and samples never overlap.
/// Producers must uphold this; the dense-packed check relies on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub timing: WaveformTiming,
    offsets: Vec<i64>,
    durations: Vec<i64>,
    samples: Samples,
    dense_packed: bool,
}

impl Waveform {
    /// Build a waveform with explicit per-sample timing
    pub fn sparse(
        timing: WaveformTiming,
        offsets: Vec<i64>,
        durations: Vec<i64>,
        samples: Samples,
    ) -> Result<Self> {
        if offsets.len() != durations.len() || offsets.len() != samples.len() {
            return Err(ScopeError::InvalidWaveform(format!(
                "{} offsets, {} durations, {} samples",
                offsets.len(),
                durations.len(),
                samples.len()
            )));
        }
        let mut wfm = Self {
            timing,
            offsets,
            durations,
            samples,
            dense_packed: false,
        };
        wfm.dense_packed = wfm.detect_dense_packed();
        Ok(wfm)
    }

    /// Build a uniformly sampled waveform: offset `i`, duration 1
    pub fn dense(timing: WaveformTiming, samples: Samples) -> Self {
        let n = samples.len() as i64;
        Self {
            timing,
            offsets: (0..n).collect(),
            durations: vec![1; n as usize],
            samples,
            dense_packed: true,
        }
    }

    /// Empty waveform of the given kind
    pub fn empty(kind: SampleKind, timing: WaveformTiming) -> Self {
        Self {
            timing,
            offsets: Vec::new(),
            durations: Vec::new(),
            samples: Samples::empty(kind),
            dense_packed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn kind(&self) -> SampleKind {
        self.samples.kind()
    }

    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    pub fn durations(&self) -> &[i64] {
        &self.durations
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    /// True iff every offset equals its index and every duration is 1
    pub fn dense_packed(&self) -> bool {
        self.dense_packed
    }

    /// Endpoint check for dense packing.
    ///
    /// Only the first and last samples are examined. Monotonic,
    /// non-overlapping offsets make that sufficient: if sample 0 starts at 0
    /// and sample n-1 starts at n-1 with duration 1, nothing in between can
    /// have a gap or a longer duration.
    pub fn detect_dense_packed(&self) -> bool {
        let Some(&last_offset) = self.offsets.last() else {
            return false;
        };
        let nlast = self.offsets.len() as i64 - 1;
        self.offsets[0] == 0 && last_offset == nlast && self.durations[nlast as usize] == 1
    }

    /// Start time of sample `i` relative to the trigger, in femtoseconds
    pub fn sample_time_fs(&self, i: usize) -> i64 {
        self.offsets[i] * self.timing.timescale + self.timing.trigger_phase
    }

    /// Min/max/mean over the sample values (digital counts as 0/1)
    pub fn summary(&self) -> WaveformSummary {
        let (mut min, mut max, mut sum) = (f32::INFINITY, f32::NEG_INFINITY, 0.0f64);
        let mut visit = |v: f32| {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
        };
        match &self.samples {
            Samples::Analog(v) => v.iter().copied().for_each(&mut visit),
            Samples::Digital(v) => v.iter().for_each(|&b| visit(if b { 1.0 } else { 0.0 })),
        }
        let len = self.len();
        if len == 0 {
            return WaveformSummary {
                len,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        WaveformSummary {
            len,
            min,
            max,
            mean: (sum / len as f64) as f32,
        }
    }

    /// Split into owned parts, for codecs and filters that rebuild a waveform
    pub fn into_parts(self) -> (WaveformTiming, Vec<i64>, Vec<i64>, Samples) {
        (self.timing, self.offsets, self.durations, self.samples)
    }
}
