//! Digital NOT.

use super::{derive, missing_input, require_digital, unknown_parameter};
use crate::error::Result;
use crate::filter::{Filter, FilterContext};
use crate::types::{SampleKind, Samples, Waveform};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct InvertFilter;

impl Filter for InvertFilter {
    fn protocol(&self) -> &'static str {
        "Invert"
    }

    fn input_names(&self) -> &'static [&'static str] {
        &["in"]
    }

    fn output_kinds(&self) -> &'static [SampleKind] {
        &[SampleKind::Digital]
    }

    fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }

    fn set_parameter(&mut self, name: &str, _value: f64) -> Result<()> {
        Err(unknown_parameter(self.protocol(), name))
    }

    fn refresh(&mut self, ctx: &FilterContext) -> Result<Vec<Option<Waveform>>> {
        let input = ctx.input(0).ok_or_else(|| missing_input(self.protocol(), 0))?;
        let bits = require_digital(self.protocol(), input)?;
        let inverted = bits.iter().map(|b| !b).collect();
        Ok(vec![Some(derive(input, Samples::Digital(inverted))?)])
    }
}
