//! Session state, persistence and cross-reference ids.
//!
//! A session is the set of instruments, their captured waveforms (current
//! and historical), the filter graph built on top of them, and an opaque UI
//! section. [`SessionContext`] holds it in memory; [`save_session`] and
//! [`load_session`] move it to and from disk.

mod context;
mod document;
mod history;
mod identity;
mod metadata;
mod persist;

pub use context::SessionContext;
pub use document::{ChannelEntry, DecodeEntry, InputEntry, InstrumentEntry, SessionDocument};
pub use history::{CapturedEvent, WaveformHistory};
pub use identity::{IdTable, SessionObject, FIRST_ID};
pub use metadata::{ChannelMetadata, EventMetadata, InstrumentMetadata, TriggerPhase};
pub use persist::{
    load_session, save_session, save_session_as, LoadReport, SaveSummary, SessionPaths,
};
