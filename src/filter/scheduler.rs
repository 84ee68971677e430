use super::plan::RefreshPlan;
use super::{AnalysisCache, FilterId, FilterRegistry};
use crate::error::{Result, ScopeError};
use crate::store::WaveformStore;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Levels the filter graph into blocks and evaluates them
pub struct FilterScheduler;

/// Outcome of evaluating one plan
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Filters that actually evaluated
    pub evaluated: usize,
    /// Filters whose evaluation failed; their outputs were detached
    pub errors: Vec<(FilterId, ScopeError)>,
}

impl FilterScheduler {
    /// Level a dependency graph given as `node -> filters it reads from`.
    ///
    /// A node joins the current block once none of its dependencies remain
    /// in the working set. Dependencies on ids not in the graph are treated
    /// as satisfied. On a cycle, returns the ids that could never be placed.
    pub fn level_graph(
        graph: &BTreeMap<FilterId, Vec<FilterId>>,
    ) -> std::result::Result<Vec<Vec<FilterId>>, Vec<FilterId>> {
        let mut working: BTreeSet<FilterId> = graph.keys().copied().collect();
        let mut blocks = Vec::new();

        while !working.is_empty() {
            let block: Vec<FilterId> = working
                .iter()
                .copied()
                .filter(|id| {
                    graph
                        .get(id)
                        .map_or(true, |deps| deps.iter().all(|d| !working.contains(d)))
                })
                .collect();

            if block.is_empty() {
                return Err(working.into_iter().collect());
            }
            for id in &block {
                working.remove(id);
            }
            blocks.push(block);
        }

        Ok(blocks)
    }

    /// Build a refresh plan over every live instance in `registry`
    pub fn plan(registry: &FilterRegistry) -> Result<RefreshPlan> {
        let start_time = std::time::Instant::now();

        let mut graph = BTreeMap::new();
        let mut names = BTreeMap::new();
        for inst in registry.all_instances() {
            let inst = inst.lock();
            graph.insert(inst.id(), inst.filter_dependencies().collect::<Vec<_>>());
            names.insert(inst.id(), inst.nickname().to_string());
        }

        let blocks = Self::level_graph(&graph).map_err(|stuck| ScopeError::CycleDetected {
            filters: stuck
                .iter()
                .map(|id| names.get(id).cloned().unwrap_or_else(|| id.to_string()))
                .collect(),
        })?;

        Ok(RefreshPlan::new(
            blocks,
            start_time.elapsed().as_micros() as u64,
        ))
    }

    /// Evaluate a plan: blocks in order, filters within a block in parallel.
    ///
    /// Filter failures are collected, not propagated; a failing filter's
    /// consumers see no data on that input and clear their own outputs.
    pub fn run(
        plan: &RefreshPlan,
        registry: &FilterRegistry,
        store: &WaveformStore,
        cache: &AnalysisCache,
    ) -> RefreshReport {
        let mut report = RefreshReport::default();

        for (level, block) in plan.blocks.iter().enumerate() {
            let results: Vec<(FilterId, Result<bool>)> = block
                .par_iter()
                .filter_map(|&id| registry.instance(id).map(|inst| (id, inst)))
                .map(|(id, inst)| (id, inst.lock().refresh_if_dirty(store, cache)))
                .collect();

            for (id, result) in results {
                match result {
                    Ok(true) => report.evaluated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!("Block {}: {}", level, e);
                        report.errors.push((id, e));
                    }
                }
            }
        }

        report
    }
}
