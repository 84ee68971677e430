//! Per-stream waveform storage.
//!
//! One slot per [`StreamDescriptor`]. A slot holds an `Arc<Waveform>`
//! snapshot: replacing it publishes a new snapshot and drops the store's
//! reference to the old one, so a reader that cloned the `Arc` before the
//! replace keeps a complete, immutable waveform and never sees a half
//! written buffer.
//!
//! Writers are expected to hold the session data lock; the internal
//! `RwLock` only makes individual slot operations atomic.

use crate::types::{StreamDescriptor, Waveform};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct WaveformStore {
    slots: RwLock<BTreeMap<StreamDescriptor, Arc<Waveform>>>,
}

impl WaveformStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the waveform of `stream`, returning the detached previous one
    pub fn set_data(&self, stream: StreamDescriptor, waveform: Waveform) -> Option<Arc<Waveform>> {
        self.install(stream, Arc::new(waveform))
    }

    /// Install an already shared snapshot (history replay, session load)
    pub fn install(&self, stream: StreamDescriptor, waveform: Arc<Waveform>) -> Option<Arc<Waveform>> {
        self.slots.write().insert(stream, waveform)
    }

    /// Release the store's ownership of `stream` without a replacement
    pub fn detach(&self, stream: &StreamDescriptor) -> Option<Arc<Waveform>> {
        self.slots.write().remove(stream)
    }

    pub fn get(&self, stream: &StreamDescriptor) -> Option<Arc<Waveform>> {
        self.slots.read().get(stream).cloned()
    }

    pub fn contains(&self, stream: &StreamDescriptor) -> bool {
        self.slots.read().contains_key(stream)
    }

    /// All streams that currently hold data, in descriptor order
    pub fn streams(&self) -> Vec<StreamDescriptor> {
        self.slots.read().keys().copied().collect()
    }

    /// Consistent copy of every slot
    pub fn snapshot(&self) -> BTreeMap<StreamDescriptor, Arc<Waveform>> {
        self.slots.read().clone()
    }

    /// Detach every stream matching `pred`
    pub fn detach_where(&self, mut pred: impl FnMut(&StreamDescriptor) -> bool) -> usize {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|k, _| !pred(k));
        before - slots.len()
    }

    pub fn clear(&self) {
        self.slots.write().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
