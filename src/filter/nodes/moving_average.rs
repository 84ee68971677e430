//! Trailing moving average over a window of N samples.

use super::{derive, missing_input, require_analog, unknown_parameter};
use crate::error::{Result, ScopeError};
use crate::filter::{Filter, FilterContext};
use crate::types::{SampleKind, Samples, Waveform};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    window: usize,
}

impl Default for MovingAverageFilter {
    fn default() -> Self {
        Self { window: 4 }
    }
}

impl Filter for MovingAverageFilter {
    fn protocol(&self) -> &'static str {
        "MovingAverage"
    }

    fn input_names(&self) -> &'static [&'static str] {
        &["in"]
    }

    fn output_kinds(&self) -> &'static [SampleKind] {
        &[SampleKind::Analog]
    }

    fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("window".to_string(), self.window as f64)])
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "window" => {
                if value.is_nan() || value < 1.0 {
                    return Err(ScopeError::Config(format!(
                        "MovingAverage window must be at least 1, got {}",
                        value
                    )));
                }
                self.window = value as usize;
            }
            _ => return Err(unknown_parameter(self.protocol(), name)),
        }
        Ok(())
    }

    fn refresh(&mut self, ctx: &FilterContext) -> Result<Vec<Option<Waveform>>> {
        let input = ctx.input(0).ok_or_else(|| missing_input(self.protocol(), 0))?;
        let values = require_analog(self.protocol(), input)?;

        let mut out = Vec::with_capacity(values.len());
        let mut sum = 0.0f64;
        for (i, &v) in values.iter().enumerate() {
            sum += v as f64;
            if i >= self.window {
                sum -= values[i - self.window] as f64;
            }
            let n = (i + 1).min(self.window);
            out.push((sum / n as f64) as f32);
        }
        Ok(vec![Some(derive(input, Samples::Analog(out))?)])
    }
}
