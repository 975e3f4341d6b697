use similar::TextDiff;

use hsdb_core::codes::{digits, heading};
use hsdb_core::types::TariffEntry;

use crate::{PathHit, PathRanker};

/// Scores a query against every tariff row by character-level edit
/// similarity, taking the better of the Korean and English names.
pub struct TableSimilarityRanker {
    entries: Vec<TariffEntry>,
    min_similarity: f64,
}

/// A scored tariff row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMatch {
    pub entry: TariffEntry,
    pub similarity: f64,
}

impl TableSimilarityRanker {
    pub fn new(entries: Vec<TariffEntry>, min_similarity: f64) -> Self { Self { entries, min_similarity } }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// The row for `code`: the first row extending the code's digits, or
    /// failing that the first row under the same heading.
    pub fn lookup(&self, code: &str) -> Option<&TariffEntry> {
        let wanted = digits(code);
        if wanted.len() < 4 { return None; }
        self.entries
            .iter()
            .find(|e| digits(&e.code).starts_with(&wanted))
            .or_else(|| self.entries.iter().find(|e| digits(&e.code).starts_with(&wanted[..4])))
    }

    /// Rows whose similarity exceeds the floor, best first, ties by code.
    pub fn search(&self, query: &str, top_n: usize) -> Vec<TableMatch> {
        let query = query.trim().to_lowercase();
        if query.is_empty() { return Vec::new(); }
        let mut matches: Vec<TableMatch> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let similarity = similarity(&query, &entry.name_ko).max(similarity(&query, &entry.name_en));
                (similarity > self.min_similarity).then(|| TableMatch { entry: entry.clone(), similarity })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.entry.code.cmp(&b.entry.code))
        });
        matches.truncate(top_n);
        matches
    }
}

impl PathRanker for TableSimilarityRanker {
    fn rank(&self, query: &str, limit: usize) -> anyhow::Result<Vec<PathHit>> {
        Ok(self
            .search(query, limit)
            .into_iter()
            .filter_map(|m| {
                let code = heading(&m.entry.code)?;
                let label = if m.entry.name_ko.is_empty() { m.entry.name_en } else { m.entry.name_ko };
                Some(PathHit { code, score: m.similarity, label: Some(label) })
            })
            .collect())
    }
}

/// `2 * matches / (len(a) + len(b))` over characters, in `[0, 1]`.
fn similarity(query_lower: &str, name: &str) -> f64 {
    if name.trim().is_empty() { return 0.0; }
    let name = name.to_lowercase();
    f64::from(TextDiff::from_chars(query_lower, name.as_str()).ratio())
}
