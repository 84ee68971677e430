//! Session document (`.scopesession`).
//!
//! Three sections: `instruments`, `decodes` (filter configuration) and an
//! opaque `ui_config` owned by whatever front end wrote it. Instruments,
//! their channels and filters each carry an id from an [`IdTable`]; filter
//! inputs refer to channels and filters by that id.
//!
//! [`IdTable`]: super::IdTable

use crate::error::Result;
use crate::instrument::{ChannelInfo, InstrumentInfo};
use crate::types::SampleKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(default)]
    pub instruments: Vec<InstrumentEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decodes: Vec<DecodeEntry>,
    #[serde(default, skip_serializing_if = "serde_yaml::Value::is_null")]
    pub ui_config: serde_yaml::Value,
}

impl SessionDocument {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentEntry {
    pub id: u32,
    pub nickname: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

impl InstrumentEntry {
    pub fn to_info(&self) -> InstrumentInfo {
        InstrumentInfo {
            nickname: self.nickname.clone(),
            name: self.name.clone(),
            vendor: self.vendor.clone(),
            serial: self.serial.clone(),
            channels: self
                .channels
                .iter()
                .map(|c| ChannelInfo {
                    index: c.index,
                    name: c.name.clone(),
                    kind: c.kind,
                    streams: c.streams,
                })
                .collect(),
        }
    }
}

fn default_streams() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub id: u32,
    pub index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: SampleKind,
    #[serde(default = "default_streams")]
    pub streams: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeEntry {
    pub id: u32,
    pub protocol: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    /// Keyed by input port name
    #[serde(default)]
    pub inputs: BTreeMap<String, InputEntry>,
}

fn is_zero(v: &usize) -> bool {
    *v == 0
}

/// Reference to a stream by owner id (channel or filter) and stream index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEntry {
    pub channel: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub stream: usize,
}
