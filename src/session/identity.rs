//! Object ↔ integer id table for session documents.
//!
//! A session document references shared objects (instruments, channels,
//! filters, UI container nodes) by small integers so that an object is
//! written once and referenced from anywhere, cycles included. A fresh
//! table is built for every save and every load; there is no removal.

use crate::error::{Result, ScopeError};
use crate::filter::FilterId;
use crate::types::InstrumentId;
use std::collections::{BTreeMap, HashMap};

/// First id handed out by a fresh table. Zero is left free so that a
/// missing or defaulted id in a hand-edited document never aliases an object.
pub const FIRST_ID: u32 = 1;

/// Any object that can be referenced from a session document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionObject {
    Instrument(InstrumentId),
    Channel {
        instrument: InstrumentId,
        index: usize,
    },
    Filter(FilterId),
    /// Opaque handle owned by the UI layer
    UiNode(u64),
}

#[derive(Debug, Clone)]
pub struct IdTable {
    by_object: HashMap<SessionObject, u32>,
    by_id: BTreeMap<u32, SessionObject>,
    next_id: u32,
}

impl IdTable {
    pub fn new() -> Self {
        Self {
            by_object: HashMap::new(),
            by_id: BTreeMap::new(),
            next_id: FIRST_ID,
        }
    }

    /// Id of `object`, allocating the next id if it has none yet
    pub fn id_of(&mut self, object: SessionObject) -> u32 {
        if let Some(&id) = self.by_object.get(&object) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_object.insert(object, id);
        self.by_id.insert(id, object);
        id
    }

    /// Id of `object` if already assigned
    pub fn lookup(&self, object: &SessionObject) -> Option<u32> {
        self.by_object.get(object).copied()
    }

    /// Record an id read from a document.
    ///
    /// Rebinding an id to the same object is a no-op. Rebinding it to a
    /// different object is an error: the document is inconsistent.
    pub fn bind(&mut self, id: u32, object: SessionObject) -> Result<()> {
        match self.by_id.get(&id) {
            Some(existing) if *existing == object => return Ok(()),
            Some(existing) => {
                return Err(ScopeError::Serialization(format!(
                    "id {} bound to both {:?} and {:?}",
                    id, existing, object
                )))
            }
            None => {}
        }
        let next = id
            .checked_add(1)
            .ok_or_else(|| ScopeError::Serialization(format!("id {} is out of range", id)))?;
        self.by_id.insert(id, object);
        self.by_object.insert(object, id);
        self.next_id = self.next_id.max(next);
        Ok(())
    }

    /// Object behind `id`. `None` is a dangling reference; callers treat the
    /// referencing feature as absent.
    pub fn object_of(&self, id: u32) -> Option<SessionObject> {
        self.by_id.get(&id).copied()
    }

    pub fn instrument(&self, id: u32) -> Option<InstrumentId> {
        match self.object_of(id)? {
            SessionObject::Instrument(i) => Some(i),
            _ => None,
        }
    }

    pub fn channel(&self, id: u32) -> Option<(InstrumentId, usize)> {
        match self.object_of(id)? {
            SessionObject::Channel { instrument, index } => Some((instrument, index)),
            _ => None,
        }
    }

    pub fn filter(&self, id: u32) -> Option<FilterId> {
        match self.object_of(id)? {
            SessionObject::Filter(f) => Some(f),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for IdTable {
    fn default() -> Self {
        Self::new()
    }
}
