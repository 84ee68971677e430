//! Built-in filter implementations.

mod invert;
mod moving_average;
mod scale;
mod subtract;
mod threshold;

pub use invert::InvertFilter;
pub use moving_average::MovingAverageFilter;
pub use scale::ScaleFilter;
pub use subtract::SubtractFilter;
pub use threshold::ThresholdFilter;

use crate::error::{Result, ScopeError};
use crate::types::{Samples, Waveform};

/// New waveform on the timebase of `input`, truncated to `samples.len()`
pub(crate) fn derive(input: &Waveform, samples: Samples) -> Result<Waveform> {
    let n = samples.len().min(input.len());
    Waveform::sparse(
        input.timing,
        input.offsets()[..n].to_vec(),
        input.durations()[..n].to_vec(),
        samples,
    )
}

pub(crate) fn require_analog<'a>(protocol: &str, input: &'a Waveform) -> Result<&'a [f32]> {
    input
        .samples()
        .as_analog()
        .ok_or_else(|| ScopeError::InvalidWaveform(format!("{} requires an analog input", protocol)))
}

pub(crate) fn require_digital<'a>(protocol: &str, input: &'a Waveform) -> Result<&'a [bool]> {
    input
        .samples()
        .as_digital()
        .ok_or_else(|| ScopeError::InvalidWaveform(format!("{} requires a digital input", protocol)))
}

pub(crate) fn unknown_parameter(protocol: &str, name: &str) -> ScopeError {
    ScopeError::UnknownParameter {
        protocol: protocol.to_string(),
        name: name.to_string(),
    }
}

pub(crate) fn missing_input(protocol: &str, index: usize) -> ScopeError {
    ScopeError::InvalidWaveform(format!("{} input {} missing", protocol, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AnalysisCache, Filter, FilterContext};
    use crate::types::{InstrumentId, StreamDescriptor, WaveformTiming};
    use std::sync::Arc;

    fn analog(values: &[f32]) -> Arc<Waveform> {
        Arc::new(Waveform::dense(WaveformTiming::new(10), Samples::Analog(values.to_vec())))
    }

    fn ctx<'a>(cache: &'a AnalysisCache, inputs: Vec<Arc<Waveform>>) -> FilterContext<'a> {
        let inputs = inputs
            .into_iter()
            .enumerate()
            .map(|(i, w)| (StreamDescriptor::instrument(InstrumentId(0), i, 0), w))
            .collect();
        FilterContext::new(inputs, cache)
    }

    fn single_output(mut outputs: Vec<Option<Waveform>>) -> Waveform {
        assert_eq!(outputs.len(), 1);
        outputs.remove(0).unwrap()
    }

    #[test]
    fn test_scale_keeps_timebase() {
        let cache = AnalysisCache::new();
        let mut f = ScaleFilter::default();
        f.set_parameter("gain", -2.0).unwrap();
        f.set_parameter("offset", 1.0).unwrap();

        let out = single_output(f.refresh(&ctx(&cache, vec![analog(&[0.0, 1.0, 2.0])])).unwrap());
        assert_eq!(out.samples().as_analog().unwrap(), &[1.0, -1.0, -3.0]);
        assert_eq!(out.timing.timescale, 10);
        assert!(out.dense_packed());
    }

    #[test]
    fn test_unknown_parameter() {
        let mut f = ScaleFilter::default();
        assert!(matches!(
            f.set_parameter("bogus", 1.0),
            Err(ScopeError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_subtract_truncates_to_shorter() {
        let cache = AnalysisCache::new();
        let mut f = SubtractFilter;
        let out = single_output(
            f.refresh(&ctx(&cache, vec![analog(&[5.0, 5.0, 5.0]), analog(&[1.0, 2.0])]))
                .unwrap(),
        );
        assert_eq!(out.samples().as_analog().unwrap(), &[4.0, 3.0]);
    }

    #[test]
    fn test_threshold_auto_level_uses_cache() {
        let cache = AnalysisCache::new();
        let mut f = ThresholdFilter::default();
        f.set_parameter("auto", 1.0).unwrap();

        let out = single_output(f.refresh(&ctx(&cache, vec![analog(&[0.0, 1.0, 2.0, 3.0])])).unwrap());
        assert_eq!(out.samples().as_digital().unwrap(), &[false, false, true, true]);
        assert!((f.level() - 1.5).abs() < 1e-6);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_moving_average() {
        let cache = AnalysisCache::new();
        let mut f = MovingAverageFilter::default();
        f.set_parameter("window", 2.0).unwrap();
        assert!(f.set_parameter("window", 0.0).is_err());

        let out = single_output(f.refresh(&ctx(&cache, vec![analog(&[2.0, 4.0, 6.0])])).unwrap());
        assert_eq!(out.samples().as_analog().unwrap(), &[2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_invert_rejects_analog() {
        let cache = AnalysisCache::new();
        let mut f = InvertFilter;
        assert!(f.refresh(&ctx(&cache, vec![analog(&[1.0])])).is_err());

        let digital = Arc::new(Waveform::dense(
            WaveformTiming::new(1),
            Samples::Digital(vec![true, false]),
        ));
        let out = single_output(f.refresh(&ctx(&cache, vec![digital])).unwrap());
        assert_eq!(out.samples().as_digital().unwrap(), &[false, true]);
    }
}
