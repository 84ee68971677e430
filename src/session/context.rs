//! Session-wide state and its locking discipline.
//!
//! Every mutation of instrument, waveform or filter state happens under the
//! recursive data lock returned by [`SessionContext::lock`]. It is
//! re-entrant so a harvest can trigger a filter refresh that takes the same
//! lock again on the same thread. The filter registry keeps its own
//! instance lock, so enumerating filters does not need the data lock.

use super::history::{CapturedEvent, WaveformHistory};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::filter::{AnalysisCache, FilterRegistry, FilterScheduler, RefreshReport};
use crate::instrument::{Instrument, InstrumentInfo, OfflineInstrument, PendingCapture};
use crate::store::WaveformStore;
use crate::types::{InstrumentId, StreamDescriptor};
use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct SessionContext {
    data_lock: ReentrantMutex<()>,
    store: WaveformStore,
    filters: FilterRegistry,
    cache: AnalysisCache,
    history: Mutex<WaveformHistory>,
    instruments: RwLock<Vec<InstrumentInfo>>,
    ui_config: RwLock<serde_yaml::Value>,
    config: SessionConfig,
}

impl SessionContext {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_registry(config, FilterRegistry::with_builtins())
    }

    /// Context using a caller-supplied filter registry
    pub fn with_registry(config: SessionConfig, filters: FilterRegistry) -> Self {
        Self {
            data_lock: ReentrantMutex::new(()),
            store: WaveformStore::new(),
            filters,
            cache: AnalysisCache::new(),
            history: Mutex::new(WaveformHistory::new(config.history_depth)),
            instruments: RwLock::new(Vec::new()),
            ui_config: RwLock::new(serde_yaml::Value::Null),
            config,
        }
    }

    /// Acquire the session data lock. Re-entrant on the same thread.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.data_lock.lock()
    }

    pub fn store(&self) -> &WaveformStore {
        &self.store
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> MutexGuard<'_, WaveformHistory> {
        self.history.lock()
    }

    pub fn instruments(&self) -> Vec<InstrumentInfo> {
        self.instruments.read().clone()
    }

    pub fn set_instruments(&self, instruments: Vec<InstrumentInfo>) {
        let _guard = self.lock();
        *self.instruments.write() = instruments;
    }

    /// Offline stand-ins for every instrument in the session
    pub fn offline_instruments(&self) -> Vec<Box<dyn Instrument>> {
        self.instruments
            .read()
            .iter()
            .cloned()
            .map(|info| Box::new(OfflineInstrument::new(info)) as Box<dyn Instrument>)
            .collect()
    }

    pub fn ui_config(&self) -> serde_yaml::Value {
        self.ui_config.read().clone()
    }

    pub fn set_ui_config(&self, value: serde_yaml::Value) {
        *self.ui_config.write() = value;
    }

    /// Move harvested captures into the store and record them as one event.
    ///
    /// Returns the new event id, or `None` if nothing was captured.
    pub fn absorb(&self, captures: Vec<(InstrumentId, PendingCapture)>) -> Option<u64> {
        let _guard = self.lock();

        let mut streams = BTreeMap::new();
        for (instrument, capture) in captures {
            for s in capture.streams {
                let desc = StreamDescriptor::instrument(instrument, s.channel, s.stream);
                let waveform = Arc::new(s.waveform);
                self.store.detach(&desc);
                self.store.install(desc, Arc::clone(&waveform));
                streams.insert(desc, waveform);
            }
        }

        if streams.is_empty() {
            return None;
        }
        let count = streams.len();
        let id = self.history.lock().record(streams);
        tracing::debug!("Absorbed waveform event {} ({} streams)", id, count);
        Some(id)
    }

    /// Make `event` the current data
    pub(crate) fn install_event(&self, event: &CapturedEvent) {
        let _guard = self.lock();
        self.store
            .detach_where(|s| s.channel.instrument().is_some());
        for (desc, waveform) in &event.streams {
            self.store.install(*desc, Arc::clone(waveform));
        }
    }

    /// Re-install a history event and recompute filters.
    ///
    /// Returns false if the event is no longer in the history.
    pub fn select_history(&self, id: u64) -> bool {
        let _guard = self.lock();
        let Some(event) = self.history.lock().get(id).cloned() else {
            tracing::warn!("Waveform event {} is not in the history", id);
            return false;
        };
        self.install_event(&event);
        if let Err(e) = self.refresh_all_filters() {
            tracing::error!("Filter refresh after history selection failed: {}", e);
        }
        true
    }

    /// Full refresh: clear the analysis cache, mark every filter dirty,
    /// level the graph and evaluate it.
    ///
    /// A cyclic graph is logged and nothing is evaluated.
    pub fn refresh_all_filters(&self) -> Result<RefreshReport> {
        let _guard = self.lock();
        self.cache.clear();
        self.filters.mark_all_dirty();
        self.refresh_dirty_filters()
    }

    /// Evaluate only filters already marked dirty
    pub fn refresh_dirty_filters(&self) -> Result<RefreshReport> {
        let _guard = self.lock();
        let plan = FilterScheduler::plan(&self.filters).map_err(|e| {
            tracing::error!("Filter graph not evaluated: {}", e);
            e
        })?;
        let report = FilterScheduler::run(&plan, &self.filters, &self.store, &self.cache);
        tracing::debug!(
            "Refreshed {} filter(s) in {} block(s), {} error(s)",
            report.evaluated,
            plan.stats.block_count,
            report.errors.len()
        );
        Ok(report)
    }

    /// Drop all waveform data, history, filters and instruments
    pub fn close(&self) {
        let _guard = self.lock();
        self.store.clear();
        self.history.lock().clear();
        self.filters.clear();
        self.cache.clear();
        self.instruments.write().clear();
        *self.ui_config.write() = serde_yaml::Value::Null;
        tracing::info!("Session closed");
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
