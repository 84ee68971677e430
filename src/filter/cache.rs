//! Cross-filter analysis cache.
//!
//! Several filters may want the same summary of the same input stream during
//! one refresh (an auto-threshold and a display statistic, for example). The
//! cache computes each summary once per refresh cycle; the session clears it
//! before every full refresh so stale data never crosses a harvest.

use crate::types::{StreamDescriptor, Waveform, WaveformSummary};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct AnalysisCache {
    summaries: RwLock<HashMap<StreamDescriptor, WaveformSummary>>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of `waveform`, computed on first request for `stream`
    pub fn summary(&self, stream: StreamDescriptor, waveform: &Waveform) -> WaveformSummary {
        if let Some(s) = self.summaries.read().get(&stream) {
            return *s;
        }
        let summary = waveform.summary();
        // Another worker may have raced us here; both computed the same value
        *self.summaries.write().entry(stream).or_insert(summary)
    }

    pub fn get(&self, stream: &StreamDescriptor) -> Option<WaveformSummary> {
        self.summaries.read().get(stream).copied()
    }

    pub fn clear(&self) {
        self.summaries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.summaries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstrumentId, Samples, WaveformTiming};

    #[test]
    fn test_summary_is_memoized() {
        let cache = AnalysisCache::new();
        let stream = StreamDescriptor::instrument(InstrumentId(0), 0, 0);
        let a = Waveform::dense(WaveformTiming::new(1), Samples::Analog(vec![1.0, 3.0]));
        let b = Waveform::dense(WaveformTiming::new(1), Samples::Analog(vec![10.0]));

        assert_eq!(cache.summary(stream, &a).mean, 2.0);
        // Same key returns the cached value even for different data
        assert_eq!(cache.summary(stream, &b).mean, 2.0);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.summary(stream, &b).mean, 10.0);
    }
}
