//! hsdb-text
//!
//! Character n-gram TF-IDF index over one collection. Built once from an
//! immutable collection; document vectors and their norms are precomputed so
//! a query only touches the postings of its own n-grams.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use hsdb_core::types::{Collection, CollectionKind, Document};

use crate::normalize::term_counts;

/// One document's weight for a term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Posting {
	pub doc: u32,
	pub weight: f64,
}

#[derive(Debug)]
pub struct NgramIndex {
	collection: Arc<Collection>,
	pub(crate) postings: HashMap<String, Vec<Posting>>,
	pub(crate) doc_freq: HashMap<String, usize>,
	pub(crate) norms: Vec<f64>,
}

impl NgramIndex {
	/// Weight of a term in a document is `tf * idf` (see [`idf`](Self::idf)).
	/// The index keeps the collection it was built from, so hits always
	/// resolve.
	pub fn build(collection: impl Into<Arc<Collection>>) -> Self {
		let collection = collection.into();
		let started = std::time::Instant::now();
		let docs = collection.documents();
		let counts: Vec<BTreeMap<String, u32>> = docs.iter().map(|d| term_counts(&d.body)).collect();

		let mut doc_freq: HashMap<String, usize> = HashMap::new();
		for terms in &counts {
			for term in terms.keys() {
				*doc_freq.entry(term.clone()).or_insert(0) += 1;
			}
		}

		let total = docs.len();
		let mut postings: HashMap<String, Vec<Posting>> = HashMap::with_capacity(doc_freq.len());
		let mut norms = Vec::with_capacity(total);
		for (pos, terms) in counts.into_iter().enumerate() {
			let mut sum_sq = 0.0;
			for (term, tf) in terms {
				let weight = f64::from(tf) * idf(total, doc_freq.get(&term).copied().unwrap_or(0));
				sum_sq += weight * weight;
				postings.entry(term).or_default().push(Posting { doc: pos as u32, weight });
			}
			norms.push(sum_sq.sqrt());
		}

		let index = Self {
			collection,
			postings,
			doc_freq,
			norms,
		};
		tracing::info!(
			collection = %index.kind(),
			documents = index.len(),
			terms = index.vocabulary_size(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"ngram index built"
		);
		index
	}

	pub fn kind(&self) -> CollectionKind { self.collection.kind() }

	pub fn collection(&self) -> &Arc<Collection> { &self.collection }

	pub fn document(&self, id: &str) -> Option<&Document> { self.collection.get(id) }

	pub fn len(&self) -> usize { self.collection.len() }

	pub fn is_empty(&self) -> bool { self.collection.is_empty() }

	pub fn vocabulary_size(&self) -> usize { self.postings.len() }

	/// Number of documents containing `term`.
	pub fn document_frequency(&self, term: &str) -> usize { self.doc_freq.get(term).copied().unwrap_or(0) }

	/// Inverse document frequency of `term` against this collection.
	pub fn idf(&self, term: &str) -> f64 { idf(self.len(), self.document_frequency(term)) }
}

/// Smoothed `ln((1 + N) / (1 + df)) + 1`: at least 1, so a term present in
/// every document still weighs in and a longer shared substring always adds.
pub(crate) fn idf(total: usize, df: usize) -> f64 {
	if total == 0 { return 0.0; }
	((1 + total) as f64 / (1 + df) as f64).ln() + 1.0
}
