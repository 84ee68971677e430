//! Scale: `out = in * gain + offset` on analog streams.

use super::{derive, missing_input, require_analog, unknown_parameter};
use crate::error::Result;
use crate::filter::{Filter, FilterContext};
use crate::types::{SampleKind, Samples, Waveform};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ScaleFilter {
    gain: f64,
    offset: f64,
}

impl Default for ScaleFilter {
    fn default() -> Self {
        Self {
            gain: 1.0,
            offset: 0.0,
        }
    }
}

impl Filter for ScaleFilter {
    fn protocol(&self) -> &'static str {
        "Scale"
    }

    fn input_names(&self) -> &'static [&'static str] {
        &["in"]
    }

    fn output_kinds(&self) -> &'static [SampleKind] {
        &[SampleKind::Analog]
    }

    fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("gain".to_string(), self.gain),
            ("offset".to_string(), self.offset),
        ])
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "gain" => self.gain = value,
            "offset" => self.offset = value,
            _ => return Err(unknown_parameter(self.protocol(), name)),
        }
        Ok(())
    }

    fn refresh(&mut self, ctx: &FilterContext) -> Result<Vec<Option<Waveform>>> {
        let input = ctx.input(0).ok_or_else(|| missing_input(self.protocol(), 0))?;
        let values = require_analog(self.protocol(), input)?;

        let (gain, offset) = (self.gain as f32, self.offset as f32);
        let scaled = values.iter().map(|v| v * gain + offset).collect();
        Ok(vec![Some(derive(input, Samples::Analog(scaled))?)])
    }
}
