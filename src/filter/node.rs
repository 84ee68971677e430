//! Filter abstraction.
//!
//! Two layers:
//! - **`Filter` trait** implemented by every computation (built-in or
//!   registered by the embedding application).
//! - **`FilterInstance`** owns one boxed filter plus the graph state the
//!   scheduler needs: id, nickname, input wiring and the dirty flag.

use super::{AnalysisCache, FilterId};
use crate::error::{Result, ScopeError};
use crate::store::WaveformStore;
use crate::types::{SampleKind, StreamDescriptor, Waveform, WaveformSummary};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Inputs handed to [`Filter::refresh`]. Every input is connected and has data.
pub struct FilterContext<'a> {
    inputs: Vec<(StreamDescriptor, Arc<Waveform>)>,
    cache: &'a AnalysisCache,
}

impl<'a> FilterContext<'a> {
    pub fn new(inputs: Vec<(StreamDescriptor, Arc<Waveform>)>, cache: &'a AnalysisCache) -> Self {
        Self { inputs, cache }
    }

    pub fn input(&self, index: usize) -> Option<&Waveform> {
        self.inputs.get(index).map(|(_, w)| w.as_ref())
    }

    pub fn input_stream(&self, index: usize) -> Option<StreamDescriptor> {
        self.inputs.get(index).map(|(s, _)| *s)
    }

    /// Summary of an input, shared with every other filter reading that stream
    pub fn input_summary(&self, index: usize) -> Option<WaveformSummary> {
        self.inputs
            .get(index)
            .map(|(s, w)| self.cache.summary(*s, w))
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
}

/// A derived-signal computation.
pub trait Filter: Send {
    /// Protocol name the filter is registered and saved under
    fn protocol(&self) -> &'static str;

    /// Names of the input ports, in wiring order
    fn input_names(&self) -> &'static [&'static str];

    /// Sample kind of each output stream; its length is the stream count
    fn output_kinds(&self) -> &'static [SampleKind];

    /// Current parameter values
    fn parameters(&self) -> BTreeMap<String, f64>;

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()>;

    /// Compute every output stream. `None` leaves that output empty.
    fn refresh(&mut self, ctx: &FilterContext) -> Result<Vec<Option<Waveform>>>;
}

/// A filter placed in the session graph
pub struct FilterInstance {
    id: FilterId,
    nickname: String,
    inputs: Vec<Option<StreamDescriptor>>,
    dirty: bool,
    filter: Box<dyn Filter>,
}

impl FilterInstance {
    pub fn new(id: FilterId, nickname: impl Into<String>, filter: Box<dyn Filter>) -> Self {
        let inputs = vec![None; filter.input_names().len()];
        Self {
            id,
            nickname: nickname.into(),
            inputs,
            dirty: true,
            filter,
        }
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn set_nickname(&mut self, nickname: impl Into<String>) {
        self.nickname = nickname.into();
    }

    pub fn protocol(&self) -> &'static str {
        self.filter.protocol()
    }

    pub fn inputs(&self) -> &[Option<StreamDescriptor>] {
        &self.inputs
    }

    pub fn input_names(&self) -> &'static [&'static str] {
        self.filter.input_names()
    }

    pub fn set_input(&mut self, index: usize, stream: Option<StreamDescriptor>) -> Result<()> {
        if index >= self.inputs.len() {
            return Err(ScopeError::Config(format!(
                "{} has no input {} ({} inputs)",
                self.nickname,
                index,
                self.inputs.len()
            )));
        }
        self.inputs[index] = stream;
        self.dirty = true;
        Ok(())
    }

    /// Filters this one reads from
    pub fn filter_dependencies(&self) -> impl Iterator<Item = FilterId> + '_ {
        self.inputs
            .iter()
            .flatten()
            .filter_map(|s| s.channel.as_filter())
    }

    pub fn output_count(&self) -> usize {
        self.filter.output_kinds().len()
    }

    pub fn output_streams(&self) -> Vec<StreamDescriptor> {
        (0..self.output_count())
            .map(|i| StreamDescriptor::filter(self.id, i))
            .collect()
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        self.filter.parameters()
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        self.filter.set_parameter(name, value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Evaluate if dirty, publishing outputs into `store`.
    ///
    /// Returns whether an evaluation happened. Unconnected inputs, or inputs
    /// with no data yet, detach every output. A failed evaluation also
    /// detaches the outputs before returning the error.
    pub fn refresh_if_dirty(&mut self, store: &WaveformStore, cache: &AnalysisCache) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.dirty = false;

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (i, input) in self.inputs.iter().enumerate() {
            match (*input).and_then(|s| store.get(&s).map(|w| (s, w))) {
                Some(pair) => inputs.push(pair),
                None => {
                    tracing::debug!(
                        "{}: input {} ({}) has no data, clearing outputs",
                        self.nickname,
                        i,
                        self.filter.input_names().get(i).copied().unwrap_or("?")
                    );
                    self.detach_outputs(store);
                    return Ok(true);
                }
            }
        }

        let ctx = FilterContext::new(inputs, cache);
        let outputs = match self.filter.refresh(&ctx) {
            Ok(outputs) => outputs,
            Err(e) => {
                self.detach_outputs(store);
                return Err(e.with_context(format!("Filter {} failed", self.nickname)));
            }
        };

        let mut outputs = outputs.into_iter();
        for stream in self.output_streams() {
            match outputs.next().flatten() {
                Some(w) => {
                    store.set_data(stream, w);
                }
                None => {
                    store.detach(&stream);
                }
            }
        }
        Ok(true)
    }

    fn detach_outputs(&self, store: &WaveformStore) {
        for stream in self.output_streams() {
            store.detach(&stream);
        }
    }
}

impl std::fmt::Debug for FilterInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterInstance")
            .field("id", &self.id)
            .field("nickname", &self.nickname)
            .field("protocol", &self.filter.protocol())
            .field("inputs", &self.inputs)
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::nodes::ScaleFilter;
    use crate::types::{InstrumentId, Samples, WaveformTiming};

    fn scale_instance() -> FilterInstance {
        FilterInstance::new(FilterId(1), "Scale1", Box::new(ScaleFilter::default()))
    }

    #[test]
    fn test_new_instance_is_dirty_and_unwired() {
        let inst = scale_instance();
        assert!(inst.is_dirty());
        assert_eq!(inst.inputs(), &[None]);
        assert_eq!(inst.output_streams(), vec![StreamDescriptor::filter(FilterId(1), 0)]);
    }

    #[test]
    fn test_set_input_out_of_range() {
        let mut inst = scale_instance();
        assert!(matches!(inst.set_input(3, None), Err(ScopeError::Config(_))));
    }

    #[test]
    fn test_unconnected_input_detaches_outputs() {
        let store = WaveformStore::new();
        let cache = AnalysisCache::new();
        let out = StreamDescriptor::filter(FilterId(1), 0);
        store.set_data(out, Waveform::dense(WaveformTiming::new(1), Samples::Analog(vec![0.0])));

        let mut inst = scale_instance();
        assert!(inst.refresh_if_dirty(&store, &cache).unwrap());
        assert!(!store.contains(&out));
        assert!(!inst.is_dirty());
        // Clean instances no-op
        assert!(!inst.refresh_if_dirty(&store, &cache).unwrap());
    }

    #[test]
    fn test_refresh_publishes_output() {
        let store = WaveformStore::new();
        let cache = AnalysisCache::new();
        let src = StreamDescriptor::instrument(InstrumentId(0), 0, 0);
        store.set_data(src, Waveform::dense(WaveformTiming::new(1), Samples::Analog(vec![1.0, 2.0])));

        let mut inst = scale_instance();
        inst.set_input(0, Some(src)).unwrap();
        inst.set_parameter("gain", 3.0).unwrap();
        inst.refresh_if_dirty(&store, &cache).unwrap();

        let out = store.get(&StreamDescriptor::filter(FilterId(1), 0)).unwrap();
        assert_eq!(out.samples().as_analog().unwrap(), &[3.0, 6.0]);
    }

    #[test]
    fn test_failed_refresh_detaches_outputs() {
        let store = WaveformStore::new();
        let cache = AnalysisCache::new();
        let src = StreamDescriptor::instrument(InstrumentId(0), 1, 0);
        store.set_data(src, Waveform::dense(WaveformTiming::new(1), Samples::Digital(vec![true])));
        let out = StreamDescriptor::filter(FilterId(1), 0);
        store.set_data(out, Waveform::dense(WaveformTiming::new(1), Samples::Analog(vec![0.0])));

        let mut inst = scale_instance();
        inst.set_input(0, Some(src)).unwrap();
        assert!(inst.refresh_if_dirty(&store, &cache).is_err());
        assert!(!store.contains(&out));
    }
}
