use async_trait::async_trait;

use hsdb_core::codes::digits;
use hsdb_core::traits::AnalysisStep;
use hsdb_core::types::Document;
use hsdb_core::verdict::{Analysis, CodeTally, Conclusion};

/// Offline analysis step: tallies the classification codes carried by the
/// partition's documents. Deterministic and never calls out.
#[derive(Debug, Default, Clone)]
pub struct FrequencyAnalyst;

#[async_trait]
impl AnalysisStep for FrequencyAnalyst {
    async fn analyze(&self, _query: &str, documents: &[Document]) -> anyhow::Result<Analysis> {
        // (digits key, display form, count), display form is the first one seen
        let mut tallies: Vec<(String, String, usize)> = Vec::new();
        for code in documents.iter().filter_map(Document::code) {
            let key = digits(code);
            if key.is_empty() { continue; }
            match tallies.iter_mut().find(|(k, _, _)| *k == key) {
                Some(t) => t.2 += 1,
                None => tallies.push((key, code.to_string(), 1)),
            }
        }
        if tallies.is_empty() {
            return Ok(Analysis { summary: format!("none of {} documents carries a code", documents.len()), conclusion: None });
        }
        tallies.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

        let coded: usize = tallies.iter().map(|t| t.2).sum();
        let summary = format!(
            "{coded} of {} documents carry a code; {} leads with {}",
            documents.len(),
            tallies[0].1,
            tallies[0].2
        );
        Ok(Analysis {
            summary,
            conclusion: Some(Conclusion {
                tallies: tallies.into_iter().map(|(_, code, supporting)| CodeTally { code, supporting }).collect(),
                definitive: false,
            }),
        })
    }
}
