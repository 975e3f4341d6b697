use std::collections::HashMap;

use hsdb_core::types::{rank_order, RankedCandidate};

use crate::index::{idf, NgramIndex};
use crate::normalize::{normalize, term_counts};

impl NgramIndex {
	/// Top `k` documents by cosine similarity between the query's n-gram
	/// vector and each document vector.
	///
	/// Documents sharing no n-gram with the query are left out. When that
	/// leaves nothing, the first `k` documents by id are returned with score
	/// 0 so the caller still sees the collection's closest neighbourhood.
	/// A query shorter than two characters, an empty collection or `k == 0`
	/// yield an empty list.
	pub fn query(&self, text: &str, k: usize) -> Vec<RankedCandidate> {
		if !self.searchable(text, k) {
			return Vec::new();
		}
		let hits = self.matches(text, k);
		if !hits.is_empty() {
			return hits;
		}
		tracing::debug!(collection = %self.kind(), "no shared n-grams, returning zero-score neighbours");
		let mut ids: Vec<&String> = self.collection().documents().iter().map(|d| &d.id).collect();
		ids.sort();
		ids.into_iter()
			.take(k)
			.map(|id| RankedCandidate { id: id.clone(), score: 0.0, source: self.kind() })
			.collect()
	}

	/// Like [`query`](Self::query) without the fallback: every hit shares at
	/// least one n-gram with `text`.
	pub fn matches(&self, text: &str, k: usize) -> Vec<RankedCandidate> {
		if !self.searchable(text, k) {
			return Vec::new();
		}
		let terms = term_counts(text);
		let total = self.len();

		let mut query_sq = 0.0;
		let mut dots: HashMap<u32, f64> = HashMap::new();
		for (term, tf) in &terms {
			let q = f64::from(*tf) * idf(total, self.document_frequency(term));
			query_sq += q * q;
			if let Some(postings) = self.postings.get(term) {
				for p in postings {
					*dots.entry(p.doc).or_insert(0.0) += q * p.weight;
				}
			}
		}
		let query_norm = query_sq.sqrt();

		let mut hits: Vec<RankedCandidate> = dots
			.into_iter()
			.map(|(doc, dot)| {
				let denom = query_norm * self.norms[doc as usize];
				let score = if denom > 0.0 { (dot / denom).clamp(0.0, 1.0) } else { 0.0 };
				let id = self.collection().documents()[doc as usize].id.clone();
				RankedCandidate { id, score, source: self.kind() }
			})
			.collect();
		hits.sort_by(rank_order);
		hits.truncate(k);
		hits
	}

	fn searchable(&self, text: &str, k: usize) -> bool {
		k > 0 && !self.is_empty() && normalize(text).chars().count() >= 2
	}
}
