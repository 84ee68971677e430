//! `sparsev1`: fixed-size records of offset, duration and value.

use super::SPARSE_TIMING_SIZE;
use crate::error::Result;
use crate::types::{SampleKind, Samples, Waveform, WaveformTiming};

fn read_i64(bytes: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_le_bytes(raw)
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    f32::from_le_bytes(raw)
}

pub(super) fn decode(kind: SampleKind, timing: WaveformTiming, bytes: &[u8]) -> Result<Waveform> {
    let record = SPARSE_TIMING_SIZE + kind.value_size();
    let nsamples = bytes.len() / record;

    let mut offsets = Vec::with_capacity(nsamples);
    let mut durations = Vec::with_capacity(nsamples);
    let mut samples = match kind {
        SampleKind::Analog => Samples::Analog(Vec::with_capacity(nsamples)),
        SampleKind::Digital => Samples::Digital(Vec::with_capacity(nsamples)),
    };

    for chunk in bytes.chunks_exact(record) {
        offsets.push(read_i64(chunk, 0));
        durations.push(read_i64(chunk, 8));
        match &mut samples {
            Samples::Analog(v) => v.push(read_f32(chunk, SPARSE_TIMING_SIZE)),
            Samples::Digital(v) => v.push(chunk[SPARSE_TIMING_SIZE] != 0),
        }
    }

    // Waveform::sparse runs the endpoint dense-packed check
    Waveform::sparse(timing, offsets, durations, samples)
}

pub(super) fn encode(waveform: &Waveform) -> Vec<u8> {
    let record = SPARSE_TIMING_SIZE + waveform.kind().value_size();
    let mut out = Vec::with_capacity(record * waveform.len());

    let timing = waveform.offsets().iter().zip(waveform.durations());
    match waveform.samples() {
        Samples::Analog(values) => {
            for ((off, dur), v) in timing.zip(values) {
                out.extend_from_slice(&off.to_le_bytes());
                out.extend_from_slice(&dur.to_le_bytes());
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        Samples::Digital(values) => {
            for ((off, dur), &v) in timing.zip(values) {
                out.extend_from_slice(&off.to_le_bytes());
                out.extend_from_slice(&dur.to_le_bytes());
                out.push(v as u8);
            }
        }
    }
    out
}
