use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hsdb_core::codes::heading;
use hsdb_core::config::FusionSettings;
use hsdb_core::events::{EngineEvent, EventBus, EvidencePath};
use hsdb_core::types::{Confidence, FusedCandidate};
use hsdb_text::NgramIndex;

use crate::{PathHit, PathRanker};

/// Manual path: n-gram search over the explanatory manual, each hit mapped
/// to the heading its section documents.
pub struct ManualRanker {
    index: Arc<NgramIndex>,
}

impl ManualRanker {
    pub fn new(index: Arc<NgramIndex>) -> Self { Self { index } }
}

impl PathRanker for ManualRanker {
    fn rank(&self, query: &str, limit: usize) -> anyhow::Result<Vec<PathHit>> {
        Ok(self
            .index
            .matches(query, limit)
            .into_iter()
            .filter_map(|c| {
                let doc = self.index.document(&c.id)?;
                let code = heading(doc.code()?)?;
                Some(PathHit { code, score: c.score, label: doc.attribute("header2").map(str::to_string) })
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStatus {
    Completed,
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct PathReport {
    pub path: EvidencePath,
    pub status: PathStatus,
    pub hits: Vec<PathHit>,
    pub duration: Duration,
}

impl PathReport {
    pub fn failed(&self) -> bool { self.status != PathStatus::Completed }
}

/// Fused candidates plus what each path contributed.
#[derive(Debug, Clone)]
pub struct FusionReport {
    pub candidates: Vec<FusedCandidate>,
    pub table: PathReport,
    pub manual: PathReport,
}

impl FusionReport {
    pub fn all_paths_failed(&self) -> bool { self.table.failed() && self.manual.failed() }
}

pub struct DualPathFusion {
    settings: FusionSettings,
    events: EventBus,
}

impl DualPathFusion {
    pub fn new(settings: FusionSettings, events: EventBus) -> Self { Self { settings, events } }

    /// Run both paths side by side, each under its own timeout, then merge.
    /// A failed path contributes nothing; the other path still counts.
    pub async fn fuse(&self, query: &str, table: Arc<dyn PathRanker>, manual: Arc<dyn PathRanker>) -> FusionReport {
        let query: Arc<str> = Arc::from(query);
        let (table, manual) = tokio::join!(
            self.run_path(EvidencePath::Table, table, query.clone(), self.settings.table_top_n),
            self.run_path(EvidencePath::Manual, manual, query.clone(), self.settings.manual_top_k),
        );
        let candidates = merge_paths(&table.hits, &manual.hits, &self.settings);
        tracing::debug!(
            table = table.hits.len(),
            manual = manual.hits.len(),
            fused = candidates.len(),
            "paths merged"
        );
        FusionReport { candidates, table, manual }
    }

    async fn run_path(&self, path: EvidencePath, ranker: Arc<dyn PathRanker>, query: Arc<str>, limit: usize) -> PathReport {
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || ranker.rank(&query, limit));
        let (status, hits) = match tokio::time::timeout(self.settings.path_timeout(), task).await {
            Ok(Ok(Ok(hits))) => (PathStatus::Completed, hits),
            Ok(Ok(Err(e))) => (PathStatus::Failed(format!("{e:#}")), Vec::new()),
            Ok(Err(join)) => (PathStatus::Failed(format!("path task aborted: {join}")), Vec::new()),
            Err(_) => (PathStatus::TimedOut, Vec::new()),
        };
        let duration = started.elapsed();
        match &status {
            PathStatus::Completed => {
                tracing::debug!(%path, hits = hits.len(), elapsed_ms = duration.as_millis() as u64, "path completed");
                self.events.publish(EngineEvent::PathCompleted { path, candidates: hits.len(), duration_ms: duration.as_millis() });
            }
            PathStatus::Failed(reason) => {
                tracing::warn!(%path, %reason, "path failed");
                self.events.publish(EngineEvent::PathFailed { path, reason: reason.clone() });
            }
            PathStatus::TimedOut => {
                tracing::warn!(%path, timeout_s = self.settings.path_timeout_secs, "path timed out");
                self.events.publish(EngineEvent::PathFailed { path, reason: "timed out".into() });
            }
        }
        PathReport { path, status, hits, duration }
    }
}

#[derive(Default)]
struct CodeEvidence {
    table: Option<f64>,
    table_label: Option<String>,
    table_hits: usize,
    manual: Option<f64>,
    manual_hits: usize,
}

/// Blend two paths' hits into code-level candidates.
///
/// Each path is normalized by its own best score. A code seen in one path
/// only keeps that path's weighted score, so its ceiling is that weight.
/// Candidates under `min_fused_score` are dropped; the rest are ordered by
/// fused score, then code.
pub fn merge_paths(table: &[PathHit], manual: &[PathHit], settings: &FusionSettings) -> Vec<FusedCandidate> {
    let table_max = best_score(table);
    let manual_max = best_score(manual);
    let mut by_code: BTreeMap<&str, CodeEvidence> = BTreeMap::new();

    for hit in table.iter().filter(|h| h.score > 0.0 && !h.code.is_empty()) {
        let ev = by_code.entry(hit.code.as_str()).or_default();
        let norm = normalized(hit.score, table_max);
        ev.table_hits += 1;
        if ev.table.map_or(true, |s| norm > s) {
            ev.table = Some(norm);
            ev.table_label = hit.label.clone();
        }
    }
    for hit in manual.iter().filter(|h| h.score > 0.0 && !h.code.is_empty()) {
        let ev = by_code.entry(hit.code.as_str()).or_default();
        let norm = normalized(hit.score, manual_max);
        ev.manual_hits += 1;
        ev.manual = Some(ev.manual.map_or(norm, |s| s.max(norm)));
    }

    let mut fused: Vec<FusedCandidate> = by_code
        .into_iter()
        .map(|(code, ev)| {
            let score = (settings.table_weight * ev.table.unwrap_or(0.0)
                + settings.manual_weight * ev.manual.unwrap_or(0.0))
            .clamp(0.0, 1.0);
            let both = ev.table.is_some() && ev.manual.is_some();
            let confidence =
                if both && score >= settings.high_threshold { Confidence::High } else { Confidence::Medium };
            FusedCandidate {
                code: code.to_string(),
                table_score: ev.table,
                manual_score: ev.manual,
                fused_score: score,
                confidence,
                table_name: ev.table_label,
                table_evidence: ev.table_hits,
                manual_evidence: ev.manual_hits,
            }
        })
        .filter(|c| c.fused_score >= settings.min_fused_score)
        .collect();
    fused.sort_by(|a, b| {
        b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.code.cmp(&b.code))
    });
    fused
}

fn best_score(hits: &[PathHit]) -> f64 {
    hits.iter().map(|h| h.score).filter(|s| s.is_finite()).fold(0.0, f64::max)
}

fn normalized(score: f64, max: f64) -> f64 {
    if max > 0.0 && score.is_finite() { (score / max).clamp(0.0, 1.0) } else { 0.0 }
}
