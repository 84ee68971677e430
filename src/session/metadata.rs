//! Per-instrument waveform metadata (`scope_<id>_metadata.yml`).
//!
//! One entry per captured event, one channel record per stored stream.
//! Current files carry the sub-second start time in femtoseconds
//! (`time_fsec`) and an integer trigger phase. Older files used picoseconds
//! (`time_psec`), a picosecond timescale and a float trigger phase; those
//! are scaled up on load.

use crate::codec::WaveformFormat;
use crate::error::{Result, ScopeError};
use crate::types::{WaveformTiming, FS_PER_PS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMetadata {
    #[serde(default)]
    pub waveforms: BTreeMap<String, EventMetadata>,
}

impl InstrumentMetadata {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn insert(&mut self, event: EventMetadata) {
        self.waveforms.insert(format!("wfm{}", event.id), event);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_fsec: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_psec: Option<i64>,
    pub id: u64,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelMetadata>,
}

impl EventMetadata {
    pub fn new(id: u64, timestamp: i64, femtoseconds: i64) -> Self {
        Self {
            timestamp,
            time_fsec: Some(femtoseconds),
            time_psec: None,
            id,
            channels: BTreeMap::new(),
        }
    }

    pub fn add_channel(&mut self, channel: ChannelMetadata) {
        let key = if channel.stream == 0 {
            format!("ch{}", channel.index)
        } else {
            format!("ch{}_{}", channel.index, channel.stream)
        };
        self.channels.insert(key, channel);
    }

    /// Whether this entry uses the picosecond layout
    pub fn is_legacy(&self) -> bool {
        self.time_psec.is_some()
    }

    /// Sub-second start time in femtoseconds
    pub fn femtoseconds(&self) -> Result<i64> {
        match (self.time_psec, self.time_fsec) {
            (Some(ps), _) => ps.checked_mul(FS_PER_PS).ok_or_else(|| {
                ScopeError::Serialization(format!(
                    "waveform {} time_psec {} is out of range",
                    self.id, ps
                ))
            }),
            (None, Some(fs)) => Ok(fs),
            (None, None) => Err(ScopeError::Serialization(format!(
                "waveform {} has neither time_fsec nor time_psec",
                self.id
            ))),
        }
    }

    /// Full timing for one of this event's channels
    pub fn timing(&self, channel: &ChannelMetadata) -> Result<WaveformTiming> {
        let fs = self.femtoseconds()?;
        let timing = if self.is_legacy() {
            let timescale = channel.timescale.checked_mul(FS_PER_PS).ok_or_else(|| {
                ScopeError::Serialization(format!(
                    "waveform {} channel {} timescale {} is out of range",
                    self.id, channel.index, channel.timescale
                ))
            })?;
            WaveformTiming::new(timescale)
                .with_trigger_phase((channel.trigphase.as_f64() * FS_PER_PS as f64).round() as i64)
        } else {
            WaveformTiming::new(channel.timescale).with_trigger_phase(channel.trigphase.as_i64())
        };
        Ok(timing.with_start(self.timestamp, fs))
    }
}

fn is_zero(v: &usize) -> bool {
    *v == 0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub index: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub stream: usize,
    pub timescale: i64,
    pub trigphase: TriggerPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ChannelMetadata {
    pub fn new(index: usize, stream: usize, timing: &WaveformTiming, format: WaveformFormat) -> Self {
        Self {
            index,
            stream,
            timescale: timing.timescale,
            trigphase: TriggerPhase::Femtoseconds(timing.trigger_phase),
            format: Some(format.as_str().to_string()),
        }
    }

    /// Body format; entries without a tag predate it and are sparse
    pub fn format(&self) -> Result<WaveformFormat> {
        WaveformFormat::from_tag(self.format.as_deref())
    }
}

/// Trigger phase as written: integer femtoseconds, or legacy float picoseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerPhase {
    Femtoseconds(i64),
    Picoseconds(f64),
}

impl TriggerPhase {
    fn as_f64(self) -> f64 {
        match self {
            TriggerPhase::Femtoseconds(v) => v as f64,
            TriggerPhase::Picoseconds(v) => v,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            TriggerPhase::Femtoseconds(v) => v,
            TriggerPhase::Picoseconds(v) => v.round() as i64,
        }
    }
}
