//! Subtract: `out = a - b`, sample-aligned, on the timebase of `a`.

use super::{derive, missing_input, require_analog, unknown_parameter};
use crate::error::Result;
use crate::filter::{Filter, FilterContext};
use crate::types::{SampleKind, Samples, Waveform};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct SubtractFilter;

impl Filter for SubtractFilter {
    fn protocol(&self) -> &'static str {
        "Subtract"
    }

    fn input_names(&self) -> &'static [&'static str] {
        &["a", "b"]
    }

    fn output_kinds(&self) -> &'static [SampleKind] {
        &[SampleKind::Analog]
    }

    fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }

    fn set_parameter(&mut self, name: &str, _value: f64) -> Result<()> {
        Err(unknown_parameter(self.protocol(), name))
    }

    fn refresh(&mut self, ctx: &FilterContext) -> Result<Vec<Option<Waveform>>> {
        let a = ctx.input(0).ok_or_else(|| missing_input(self.protocol(), 0))?;
        let b = ctx.input(1).ok_or_else(|| missing_input(self.protocol(), 1))?;
        let (va, vb) = (
            require_analog(self.protocol(), a)?,
            require_analog(self.protocol(), b)?,
        );

        if va.len() != vb.len() {
            tracing::debug!(
                "Subtract inputs differ in length ({} vs {}), truncating",
                va.len(),
                vb.len()
            );
        }
        let diff = va.iter().zip(vb).map(|(x, y)| x - y).collect();
        Ok(vec![Some(derive(a, Samples::Analog(diff))?)])
    }
}
