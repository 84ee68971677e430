//! Threshold: analog to digital, `out = in > level`.
//!
//! With `auto` set to a nonzero value the level tracks the mean of the input,
//! read through the shared analysis cache.

use super::{derive, missing_input, require_analog, unknown_parameter};
use crate::error::Result;
use crate::filter::{Filter, FilterContext};
use crate::types::{SampleKind, Samples, Waveform};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ThresholdFilter {
    level: f64,
    auto: bool,
}

impl ThresholdFilter {
    /// Level used by the last evaluation
    pub fn level(&self) -> f64 {
        self.level
    }
}

impl Filter for ThresholdFilter {
    fn protocol(&self) -> &'static str {
        "Threshold"
    }

    fn input_names(&self) -> &'static [&'static str] {
        &["in"]
    }

    fn output_kinds(&self) -> &'static [SampleKind] {
        &[SampleKind::Digital]
    }

    fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("level".to_string(), self.level),
            ("auto".to_string(), if self.auto { 1.0 } else { 0.0 }),
        ])
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "level" => self.level = value,
            "auto" => self.auto = value != 0.0,
            _ => return Err(unknown_parameter(self.protocol(), name)),
        }
        Ok(())
    }

    fn refresh(&mut self, ctx: &FilterContext) -> Result<Vec<Option<Waveform>>> {
        let input = ctx.input(0).ok_or_else(|| missing_input(self.protocol(), 0))?;
        let values = require_analog(self.protocol(), input)?;

        if self.auto {
            if let Some(summary) = ctx.input_summary(0) {
                self.level = summary.mean as f64;
            }
        }

        let level = self.level as f32;
        let bits = values.iter().map(|&v| v > level).collect();
        Ok(vec![Some(derive(input, Samples::Digital(bits))?)])
    }
}
