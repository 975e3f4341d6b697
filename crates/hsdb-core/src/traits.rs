use async_trait::async_trait;

use crate::types::Document;
use crate::verdict::Analysis;

/// The external analysis worker: one query plus one partition of evidence
/// in, one verdict out.
///
/// Implementations must tolerate concurrent calls from independent tasks.
/// A call may be slow and may fail; the dispatcher applies the timeout.
#[async_trait]
pub trait AnalysisStep: Send + Sync {
    async fn analyze(&self, query: &str, documents: &[Document]) -> anyhow::Result<Analysis>;
}
