//! Live filter-instance registry.
//!
//! Owned by the session context and passed explicitly to whatever needs to
//! enumerate or create filters. The instance map has its own lock so
//! background work can snapshot the instance list without taking the
//! session data lock.

use super::nodes::{InvertFilter, MovingAverageFilter, ScaleFilter, SubtractFilter, ThresholdFilter};
use super::{Filter, FilterId, FilterInstance};
use crate::error::{Result, ScopeError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Constructor for a filter protocol
pub type FilterFactory = fn() -> Box<dyn Filter>;

/// Shared handle to one live filter
pub type SharedFilter = Arc<Mutex<FilterInstance>>;

pub struct FilterRegistry {
    factories: RwLock<BTreeMap<String, FilterFactory>>,
    instances: Mutex<BTreeMap<FilterId, SharedFilter>>,
    next_id: AtomicU32,
}

impl FilterRegistry {
    /// Empty registry with no protocols
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(BTreeMap::new()),
            instances: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Registry with every built-in protocol
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("Scale", || Box::new(ScaleFilter::default()));
        registry.register("Subtract", || Box::new(SubtractFilter));
        registry.register("Threshold", || Box::new(ThresholdFilter::default()));
        registry.register("MovingAverage", || Box::new(MovingAverageFilter::default()));
        registry.register("Invert", || Box::new(InvertFilter));
        registry
    }

    pub fn register(&self, protocol: impl Into<String>, factory: FilterFactory) {
        self.factories.write().insert(protocol.into(), factory);
    }

    pub fn protocols(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    /// Instantiate a filter by protocol name.
    ///
    /// Without a nickname the instance is named `<protocol><id>`.
    pub fn create(&self, protocol: &str, nickname: Option<&str>) -> Result<FilterId> {
        let factory = self
            .factories
            .read()
            .get(protocol)
            .copied()
            .ok_or_else(|| ScopeError::UnknownFilter(protocol.to_string()))?;

        let id = FilterId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let nickname = nickname.map_or_else(|| format!("{}{}", protocol, id.0), str::to_string);
        let instance = FilterInstance::new(id, nickname, factory());

        tracing::debug!("Created filter {} ({})", instance.nickname(), protocol);
        self.instances.lock().insert(id, Arc::new(Mutex::new(instance)));
        Ok(id)
    }

    pub fn instance(&self, id: FilterId) -> Option<SharedFilter> {
        self.instances.lock().get(&id).cloned()
    }

    /// Snapshot of all live instances, in id order
    pub fn all_instances(&self) -> Vec<SharedFilter> {
        self.instances.lock().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<FilterId> {
        self.instances.lock().keys().copied().collect()
    }

    pub fn remove(&self, id: FilterId) -> Option<SharedFilter> {
        self.instances.lock().remove(&id)
    }

    pub fn clear(&self) {
        self.instances.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mark_all_dirty(&self) {
        for inst in self.all_instances() {
            inst.lock().set_dirty();
        }
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
