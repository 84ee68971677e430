//! `densev1`: a bare value array, timing reconstructed from the index.

use crate::types::{SampleKind, Samples, Waveform, WaveformTiming};

pub(super) fn decode(kind: SampleKind, timing: WaveformTiming, bytes: &[u8]) -> Waveform {
    let samples = match kind {
        SampleKind::Analog => Samples::Analog(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        SampleKind::Digital => Samples::Digital(bytes.iter().map(|&b| b != 0).collect()),
    };
    Waveform::dense(timing, samples)
}

pub(super) fn encode(waveform: &Waveform) -> Vec<u8> {
    match waveform.samples() {
        Samples::Analog(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        Samples::Digital(values) => values.iter().map(|&v| v as u8).collect(),
    }
}
