//! Binary waveform body codec.
//!
//! A waveform body is the flat byte buffer holding one stream's samples,
//! stored separately from its YAML metadata header. Two layouts exist:
//!
//! | Tag        | Layout per sample                                   |
//! |------------|-----------------------------------------------------|
//! | `sparsev1` | `i64` offset, `i64` duration, value (`f32` or `u8`) |
//! | `densev1`  | value only; offset = index, duration = 1            |
//!
//! All integers and floats are little-endian. Digital values are one byte,
//! zero for false and anything else for true.
//!
//! Bodies written before the format tag existed are `sparsev1`, which is
//! why [`WaveformFormat::default`] is sparse.

mod body;
mod dense;
mod sparse;

pub use body::WaveformBody;

use crate::error::{Result, ScopeError};
use crate::types::{SampleKind, Waveform, WaveformTiming};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Bytes of the offset/duration header of a sparse record
pub const SPARSE_TIMING_SIZE: usize = 2 * std::mem::size_of::<i64>();

/// On-disk body encoding, selected per stream by the `format` metadata tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaveformFormat {
    #[default]
    SparseV1,
    DenseV1,
}

impl WaveformFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaveformFormat::SparseV1 => "sparsev1",
            WaveformFormat::DenseV1 => "densev1",
        }
    }

    /// Parse an optional metadata tag; a missing tag means `sparsev1`
    pub fn from_tag(tag: Option<&str>) -> Result<Self> {
        tag.map_or(Ok(Self::default()), str::parse)
    }

    /// Size of one stored sample for this format and sample kind
    pub fn record_size(&self, kind: SampleKind) -> usize {
        match self {
            WaveformFormat::SparseV1 => SPARSE_TIMING_SIZE + kind.value_size(),
            WaveformFormat::DenseV1 => kind.value_size(),
        }
    }
}

impl FromStr for WaveformFormat {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sparsev1" => Ok(WaveformFormat::SparseV1),
            "densev1" => Ok(WaveformFormat::DenseV1),
            other => Err(ScopeError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for WaveformFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a body buffer into a waveform.
///
/// A buffer whose length is not a whole number of records is truncated to
/// the last complete record and a warning is logged.
pub fn decode(
    format: WaveformFormat,
    kind: SampleKind,
    timing: WaveformTiming,
    bytes: &[u8],
) -> Result<Waveform> {
    let record = format.record_size(kind);
    let trailing = bytes.len() % record;
    if trailing != 0 {
        tracing::warn!(
            "{} body of {} bytes has a {}-byte partial trailing record; truncating",
            format,
            bytes.len(),
            trailing
        );
    }

    match format {
        WaveformFormat::SparseV1 => sparse::decode(kind, timing, bytes),
        WaveformFormat::DenseV1 => Ok(dense::decode(kind, timing, bytes)),
    }
}

/// Encode a waveform body.
///
/// Encoding a non-dense waveform as `densev1` drops its offsets and
/// durations; decoding it back yields index offsets and unit durations.
pub fn encode(waveform: &Waveform, format: WaveformFormat) -> Vec<u8> {
    match format {
        WaveformFormat::SparseV1 => sparse::encode(waveform),
        WaveformFormat::DenseV1 => {
            if !waveform.dense_packed() {
                tracing::debug!(
                    "Encoding {}-sample sparse waveform as densev1; sample timing is discarded",
                    waveform.len()
                );
            }
            dense::encode(waveform)
        }
    }
}

/// Pick the format a waveform should be saved with
pub fn preferred_format(waveform: &Waveform, default: WaveformFormat) -> WaveformFormat {
    if waveform.dense_packed() {
        WaveformFormat::DenseV1
    } else if default == WaveformFormat::DenseV1 {
        // Never lose timing on a sparse capture
        WaveformFormat::SparseV1
    } else {
        default
    }
}

/// Map a body file and decode it.
///
/// The mapping is released when this returns, on success and on error.
pub fn decode_file(
    path: impl AsRef<Path>,
    format: WaveformFormat,
    kind: SampleKind,
    timing: WaveformTiming,
) -> Result<Waveform> {
    let body = WaveformBody::open(path)?;
    decode(format, kind, timing, body.bytes())
}

/// Encode a waveform and write it to `path`
pub fn encode_file(
    path: impl AsRef<Path>,
    waveform: &Waveform,
    format: WaveformFormat,
) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, encode(waveform, format)).map_err(|e| {
        ScopeError::Io(e).with_context(format!("Failed to write waveform body {:?}", path))
    })
}
