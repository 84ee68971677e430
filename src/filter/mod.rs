//! Derived-signal filter graph.
//!
//! Filters read instrument channel streams or other filters' output streams
//! and publish their own outputs into the [`WaveformStore`](crate::store::WaveformStore).
//! A full refresh marks every instance dirty, levels the graph into blocks
//! with [`FilterScheduler::plan`], then evaluates block by block.
//!
//! ```text
//! block 0: [Scale1] [Subtract2]      (read instrument channels only)
//! block 1: [Threshold3]              (reads Scale1)
//! block 2: [Invert4]                 (reads Threshold3)
//! ```

mod cache;
mod id;
mod node;
pub mod nodes;
mod plan;
mod registry;
mod scheduler;

pub use cache::AnalysisCache;
pub use id::FilterId;
pub use node::{Filter, FilterContext, FilterInstance};
pub use plan::{PlanStats, RefreshPlan};
pub use registry::{FilterFactory, FilterRegistry, SharedFilter};
pub use scheduler::{FilterScheduler, RefreshReport};
