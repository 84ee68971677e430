//! Bounded history of captured trigger events.

use crate::error::{Result, ScopeError};
use crate::types::{StreamDescriptor, Waveform};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// One harvested multi-instrument trigger event
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub id: u64,
    /// Whole seconds of the capture start
    pub timestamp: i64,
    /// Sub-second remainder, femtoseconds
    pub femtoseconds: i64,
    pub streams: BTreeMap<StreamDescriptor, Arc<Waveform>>,
}

impl CapturedEvent {
    /// Ordering key for "newest"
    pub fn time_key(&self) -> (i64, i64) {
        (self.timestamp, self.femtoseconds)
    }
}

/// Most recent events, oldest evicted first
#[derive(Debug)]
pub struct WaveformHistory {
    events: VecDeque<CapturedEvent>,
    depth: usize,
    next_id: u64,
}

impl WaveformHistory {
    pub fn new(depth: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(depth),
            depth: depth.max(1),
            next_id: 1,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth.max(1);
        self.evict();
    }

    /// Record a freshly harvested event and return its id.
    ///
    /// The event time is taken from the first stream's start time.
    pub fn record(&mut self, streams: BTreeMap<StreamDescriptor, Arc<Waveform>>) -> u64 {
        let (timestamp, femtoseconds) = streams
            .values()
            .next()
            .map(|w| (w.timing.start_timestamp, w.timing.start_femtoseconds))
            .unwrap_or_else(|| {
                let now = chrono::Utc::now();
                (now.timestamp(), now.timestamp_subsec_nanos() as i64 * 1_000_000)
            });

        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.push(CapturedEvent {
            id,
            timestamp,
            femtoseconds,
            streams,
        });
        id
    }

    /// Insert an event that already has an id (restored from disk).
    ///
    /// The id must leave room for a successor, otherwise the event is rejected.
    pub fn insert(&mut self, event: CapturedEvent) -> Result<()> {
        let next = event.id.checked_add(1).ok_or_else(|| {
            ScopeError::Serialization(format!("waveform event id {} is out of range", event.id))
        })?;
        self.next_id = self.next_id.max(next);
        self.push(event);
        Ok(())
    }

    fn push(&mut self, event: CapturedEvent) {
        self.events.push_back(event);
        self.evict();
    }

    fn evict(&mut self) {
        while self.events.len() > self.depth {
            if let Some(old) = self.events.pop_front() {
                tracing::trace!("Evicting waveform event {}", old.id);
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<&CapturedEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Event with the latest capture time
    pub fn newest(&self) -> Option<&CapturedEvent> {
        self.events.iter().max_by_key(|e| (e.time_key(), e.id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedEvent> {
        self.events.iter()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.events.iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop every event and restart numbering
    pub fn clear(&mut self) {
        self.events.clear();
        self.next_id = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstrumentId, Samples, WaveformTiming};

    fn event_at(seconds: i64, fs: i64) -> BTreeMap<StreamDescriptor, Arc<Waveform>> {
        let timing = WaveformTiming::new(1000).with_start(seconds, fs);
        let mut streams = BTreeMap::new();
        streams.insert(
            StreamDescriptor::instrument(InstrumentId(0), 0, 0),
            Arc::new(Waveform::dense(timing, Samples::Analog(vec![0.0; 4]))),
        );
        streams
    }

    #[test]
    fn test_bounded_depth() {
        let mut history = WaveformHistory::new(3);
        let ids: Vec<u64> = (0..5).map(|i| history.record(event_at(i, 0))).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(history.ids(), vec![3, 4, 5]);
        assert!(history.get(1).is_none());
    }

    #[test]
    fn test_newest_by_time_not_insertion() {
        let mut history = WaveformHistory::new(10);
        history.insert(CapturedEvent {
            id: 7,
            timestamp: 100,
            femtoseconds: 5,
            streams: event_at(100, 5),
        })
        .unwrap();
        history.insert(CapturedEvent {
            id: 3,
            timestamp: 100,
            femtoseconds: 9,
            streams: event_at(100, 9),
        })
        .unwrap();
        history.insert(CapturedEvent {
            id: 4,
            timestamp: 99,
            femtoseconds: 0,
            streams: event_at(99, 0),
        })
        .unwrap();

        assert_eq!(history.newest().map(|e| e.id), Some(3));
        // Restored ids push the allocator forward
        assert_eq!(history.record(event_at(1, 0)), 8);
    }

    #[test]
    fn test_insert_rejects_last_id() {
        let mut history = WaveformHistory::new(4);
        let result = history.insert(CapturedEvent {
            id: u64::MAX,
            timestamp: 0,
            femtoseconds: 0,
            streams: event_at(0, 0),
        });
        assert!(result.is_err());
        assert!(history.is_empty());
        assert_eq!(history.record(event_at(0, 0)), 1);
    }

    #[test]
    fn test_shrinking_depth_evicts() {
        let mut history = WaveformHistory::new(4);
        for i in 0..4 {
            history.record(event_at(i, 0));
        }
        history.set_depth(2);
        assert_eq!(history.ids(), vec![3, 4]);
    }
}
