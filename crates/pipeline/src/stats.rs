use crate::pool::PoolSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTotal {
    pub metric: String,
    pub total: i64,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Pipeline that produced the totals
    pub pipeline: String,

    /// Final totals in registration order
    pub totals: Vec<MetricTotal>,

    /// Files fully scanned
    pub files_processed: usize,

    /// Files skipped (missing, unreadable, undecodable or unwritable)
    pub files_skipped: usize,

    /// Admission pool state after the barrier
    pub pool: PoolSnapshot,

    /// Time taken in milliseconds
    pub time_ms: u64,
}

impl BatchSummary {
    pub fn total(&self, metric: &str) -> Option<i64> {
        self.totals
            .iter()
            .find(|t| t.metric == metric)
            .map(|t| t.total)
    }
}
