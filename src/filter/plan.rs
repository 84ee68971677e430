use super::FilterId;

/// Leveled evaluation order for one refresh of the filter graph.
///
/// Blocks run strictly in order. Filters inside a block have no
/// dependencies on each other and may run in parallel.
#[derive(Debug, Clone, Default)]
pub struct RefreshPlan {
    pub blocks: Vec<Vec<FilterId>>,
    pub stats: PlanStats,
}

/// Statistics about a leveled plan
#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    /// Number of filters scheduled
    pub total_filters: usize,

    /// Number of blocks (graph depth)
    pub block_count: usize,

    /// Size of the largest block
    pub widest_block: usize,

    /// Leveling time in microseconds
    pub level_time_us: u64,
}

impl RefreshPlan {
    pub fn new(blocks: Vec<Vec<FilterId>>, level_time_us: u64) -> Self {
        let stats = PlanStats {
            total_filters: blocks.iter().map(Vec::len).sum(),
            block_count: blocks.len(),
            widest_block: blocks.iter().map(Vec::len).max().unwrap_or(0),
            level_time_us,
        };
        Self { blocks, stats }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index of the block containing `id`
    pub fn block_of(&self, id: FilterId) -> Option<usize> {
        self.blocks.iter().position(|b| b.contains(&id))
    }
}
