//! Test data builders for creating test objects

use scopecore::instrument::PendingCapture;
use scopecore::session::SessionContext;
use scopecore::types::{InstrumentId, Samples, Waveform, WaveformTiming};

/// Builder for analog test waveforms
pub struct WaveformBuilder {
    timing: WaveformTiming,
    values: Vec<f32>,
    offsets: Option<Vec<i64>>,
}

impl WaveformBuilder {
    pub fn new(values: &[f32]) -> Self {
        Self {
            timing: WaveformTiming::new(1_000_000),
            values: values.to_vec(),
            offsets: None,
        }
    }

    /// `n` samples of a ramp starting at `start`
    pub fn ramp(n: usize, start: f32) -> Self {
        Self::new(&(0..n).map(|i| start + i as f32).collect::<Vec<_>>())
    }

    pub fn timescale(mut self, fs: i64) -> Self {
        self.timing.timescale = fs;
        self
    }

    pub fn start(mut self, seconds: i64, femtoseconds: i64) -> Self {
        self.timing = self.timing.with_start(seconds, femtoseconds);
        self
    }

    pub fn trigger_phase(mut self, fs: i64) -> Self {
        self.timing = self.timing.with_trigger_phase(fs);
        self
    }

    /// Place samples at these offsets, each lasting one tick
    pub fn offsets(mut self, offsets: &[i64]) -> Self {
        self.offsets = Some(offsets.to_vec());
        self
    }

    pub fn build(self) -> Waveform {
        match self.offsets {
            Some(offsets) => {
                let durations = vec![1; offsets.len()];
                Waveform::sparse(self.timing, offsets, durations, Samples::Analog(self.values))
                    .expect("matching lengths")
            }
            None => Waveform::dense(self.timing, Samples::Analog(self.values)),
        }
    }
}

/// Record one event in `session` as if it had been harvested.
///
/// `streams` lists `(instrument, channel, waveform)`.
pub fn absorb_event(session: &SessionContext, streams: Vec<(u32, usize, Waveform)>) -> u64 {
    let mut captures: Vec<(InstrumentId, PendingCapture)> = Vec::new();
    for (instrument, channel, waveform) in streams {
        let id = InstrumentId(instrument);
        match captures.iter_mut().find(|(i, _)| *i == id) {
            Some((_, capture)) => {
                let taken = std::mem::take(capture);
                *capture = taken.with_stream(channel, 0, waveform);
            }
            None => captures.push((id, PendingCapture::new().with_stream(channel, 0, waveform))),
        }
    }
    session.absorb(captures).expect("event with streams")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_builder() {
        let dense = WaveformBuilder::ramp(4, 1.0).build();
        assert!(dense.dense_packed());
        assert_eq!(dense.samples().as_analog().unwrap(), &[1.0, 2.0, 3.0, 4.0]);

        let sparse = WaveformBuilder::new(&[1.0, 2.0]).offsets(&[0, 5]).build();
        assert!(!sparse.dense_packed());
        assert_eq!(sparse.offsets(), &[0, 5]);
    }
}
