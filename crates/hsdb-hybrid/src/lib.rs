//! hsdb-hybrid
//!
//! Two independent evidence paths (tariff table similarity and manual n-gram
//! search) blended into one code-level candidate list.
pub mod table;
pub mod fusion;

pub use fusion::{merge_paths, DualPathFusion, FusionReport, ManualRanker, PathReport, PathStatus};
pub use table::TableSimilarityRanker;

/// One code-level hit from an evidence path. `code` is the four-digit
/// heading key both paths agree on.
#[derive(Debug, Clone, PartialEq)]
pub struct PathHit {
    pub code: String,
    pub score: f64,
    pub label: Option<String>,
}

/// A synchronous, CPU-bound ranking path. Implementations must be safe to
/// call from a blocking worker thread.
pub trait PathRanker: Send + Sync {
    fn rank(&self, query: &str, limit: usize) -> anyhow::Result<Vec<PathHit>>;
}
