//! Domain types shared by the ranking, fusion and dispatch crates.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub type DocId = String;
pub type Attributes = BTreeMap<String, String>;

/// Attribute holding the classification code a case was decided under.
pub const ATTR_CODE: &str = "hs_code";
/// Attribute naming the file/source a document was loaded from.
pub const ATTR_SOURCE: &str = "source";
/// Attribute holding an externally issued case number.
pub const ATTR_REFERENCE: &str = "reference_id";

/// A single immutable evidence record.
///
/// - `id`: stable identifier, unique within its collection
/// - `body`: free text that is indexed
/// - `attributes`: structured fields (classification code, source tag, ...);
///   optional fields may be absent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub body: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Document {
    pub fn new(id: impl Into<DocId>, body: impl Into<String>) -> Self {
        Self { id: id.into(), body: body.into(), attributes: Attributes::new() }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub fn code(&self) -> Option<&str> { self.attribute(ATTR_CODE) }
}

/// Which collection a document or candidate belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Domestic,
    Overseas,
    Manual,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Domestic => "domestic",
            Self::Overseas => "overseas",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// An ordered, read-only sequence of documents sharing one schema.
#[derive(Debug, Clone)]
pub struct Collection {
    kind: CollectionKind,
    documents: Vec<Document>,
    positions: HashMap<DocId, usize>,
}

impl Collection {
    /// Later documents with a duplicate id are dropped so ids stay unique.
    pub fn new(kind: CollectionKind, documents: Vec<Document>) -> Self {
        let mut positions = HashMap::with_capacity(documents.len());
        let mut kept = Vec::with_capacity(documents.len());
        for doc in documents {
            if positions.contains_key(&doc.id) {
                tracing::warn!(collection = %kind, id = %doc.id, "duplicate document id skipped");
                continue;
            }
            positions.insert(doc.id.clone(), kept.len());
            kept.push(doc);
        }
        Self { kind, documents: kept, positions }
    }

    pub fn empty(kind: CollectionKind) -> Self { Self::new(kind, Vec::new()) }

    pub fn kind(&self) -> CollectionKind { self.kind }

    pub fn documents(&self) -> &[Document] { &self.documents }

    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.positions.get(id).map(|&i| &self.documents[i])
    }
}

/// One ranked hit. Lists of candidates are kept in [`rank_order`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedCandidate {
    pub id: DocId,
    pub score: f64,
    pub source: CollectionKind,
}

/// Score descending, then id ascending.
pub fn rank_order(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id))
}

/// Coarse agreement label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::High => "HIGH", Self::Medium => "MEDIUM" })
    }
}

/// One row of the structured tariff reference table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TariffEntry {
    pub code: String,
    pub name_ko: String,
    pub name_en: String,
}

/// A code scored by the dual-path fusion ranker.
///
/// `table_score`/`manual_score` are the per-path normalized scores in
/// `[0, 1]`, `None` when the path produced no evidence for the code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedCandidate {
    pub code: String,
    pub table_score: Option<f64>,
    pub manual_score: Option<f64>,
    pub fused_score: f64,
    pub confidence: Confidence,
    pub table_name: Option<String>,
    pub table_evidence: usize,
    pub manual_evidence: usize,
}

impl FusedCandidate {
    pub fn in_both_paths(&self) -> bool { self.table_score.is_some() && self.manual_score.is_some() }

    pub fn evidence(&self) -> usize { self.table_evidence + self.manual_evidence }
}
