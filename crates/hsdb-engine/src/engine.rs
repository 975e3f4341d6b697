use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use hsdb_core::codes::{digits, extract_codes};
use hsdb_core::config::{Config, Settings};
use hsdb_core::data_processor::{KnowledgeBase, KnowledgeLoader};
use hsdb_core::error::{Error, Result};
use hsdb_core::events::EventBus;
use hsdb_core::traits::AnalysisStep;
use hsdb_core::types::{CollectionKind, Document, RankedCandidate, TariffEntry, ATTR_REFERENCE};
use hsdb_core::verdict::{Audit, FinalAnswer};
use hsdb_dispatch::{partition, Consolidator, Dispatcher, Partition};
use hsdb_hybrid::{DualPathFusion, ManualRanker, PathHit, PathRanker, TableSimilarityRanker};
use hsdb_text::{IndexHandle, NgramIndex};

use crate::kind::{QueryKind, Response};
use crate::manual::{general_rules_document, CodeDossier, ManualBook, ManualComparison, ManualEntry};

/// A ranked case together with the case itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaseHit {
    pub candidate: RankedCandidate,
    pub document: Document,
}

/// Tariff path of fusion: table matches, kept only when the manual has an
/// explanation for the code.
struct TariffPath {
    table: Arc<TableSimilarityRanker>,
    manual: Arc<NgramIndex>,
}

impl PathRanker for TariffPath {
    fn rank(&self, query: &str, limit: usize) -> anyhow::Result<Vec<PathHit>> {
        let book = ManualBook::new(self.manual.collection());
        let hits = self.table.rank(query, limit)?;
        Ok(hits.into_iter().filter(|h| book.lookup(&h.code).is_some_and(|e| !e.is_empty())).collect())
    }
}

/// Query entry points over the loaded knowledge.
///
/// Holds one swappable index per collection plus the tariff table; every
/// query works on the snapshot current when it started.
pub struct Engine {
    settings: Settings,
    domestic: IndexHandle,
    overseas: IndexHandle,
    manual: IndexHandle,
    tariff: RwLock<Arc<TableSimilarityRanker>>,
    general_rules: RwLock<Arc<Vec<String>>>,
    analyst: Arc<dyn AnalysisStep>,
    events: EventBus,
    dispatcher: Dispatcher,
    consolidator: Consolidator,
    fusion: DualPathFusion,
}

impl Engine {
    /// Engine whose indexes are not built yet; queries fail with
    /// [`Error::IndexUnavailable`] until [`reload`](Self::reload).
    pub fn unloaded(settings: Settings, analyst: Arc<dyn AnalysisStep>) -> Result<Self> {
        settings.validate()?;
        let events = EventBus::default();
        Ok(Self {
            dispatcher: Dispatcher::from_settings(&settings.dispatch, events.clone()),
            consolidator: Consolidator::new(settings.consensus.high_agreement),
            fusion: DualPathFusion::new(settings.fusion.clone(), events.clone()),
            domestic: IndexHandle::unbuilt(CollectionKind::Domestic),
            overseas: IndexHandle::unbuilt(CollectionKind::Overseas),
            manual: IndexHandle::unbuilt(CollectionKind::Manual),
            tariff: RwLock::new(Arc::new(TableSimilarityRanker::new(Vec::new(), settings.fusion.table_min_similarity))),
            general_rules: RwLock::new(Arc::new(Vec::new())),
            analyst,
            events,
            settings,
        })
    }

    pub fn new(knowledge: KnowledgeBase, settings: Settings, analyst: Arc<dyn AnalysisStep>) -> Result<Self> {
        let engine = Self::unloaded(settings, analyst)?;
        engine.reload(knowledge);
        Ok(engine)
    }

    /// Load settings and knowledge as configured and build every index.
    pub fn from_config(config: &Config, analyst: Arc<dyn AnalysisStep>) -> anyhow::Result<Self> {
        let settings = config.settings()?;
        let knowledge = KnowledgeLoader::new().load_dir(&settings.knowledge_dir())?;
        Ok(Self::new(knowledge, settings, analyst)?)
    }

    /// Like [`from_config`](Self::from_config) with knowledge read from `dir`.
    pub fn from_dir(dir: &Path, settings: Settings, analyst: Arc<dyn AnalysisStep>) -> anyhow::Result<Self> {
        let knowledge = KnowledgeLoader::new().load_dir(dir)?;
        Ok(Self::new(knowledge, settings, analyst)?)
    }

    /// Rebuild every index from fresh knowledge. Each index is swapped in
    /// whole; in-flight queries finish on the snapshot they started with.
    pub fn reload(&self, knowledge: KnowledgeBase) {
        self.domestic.rebuild(knowledge.domestic);
        self.overseas.rebuild(knowledge.overseas);
        self.manual.rebuild(knowledge.manual);
        let table = Arc::new(TableSimilarityRanker::new(knowledge.tariff, self.settings.fusion.table_min_similarity));
        match self.tariff.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
        let rules = Arc::new(knowledge.general_rules);
        match self.general_rules.write() {
            Ok(mut guard) => *guard = rules,
            Err(poisoned) => *poisoned.into_inner() = rules,
        }
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Progress events of every query run by this engine.
    pub fn events(&self) -> EventBus { self.events.clone() }

    pub async fn handle(&self, kind: QueryKind, text: &str) -> Result<Response> {
        tracing::debug!(%kind, "routing query");
        match kind {
            QueryKind::DomesticCases => self.search_domestic(text).await.map(Response::Answer),
            QueryKind::OverseasCases => self.search_overseas(text).await.map(Response::Answer),
            QueryKind::ManualWithCodes => {
                self.analyze_manual(text, &extract_codes(text)).await.map(Response::Comparison)
            }
            QueryKind::ManualFusion => self.fuse_manual_search(text).await.map(Response::Answer),
            QueryKind::ManualRaw => self.manual_raw(text).map(Response::Manual),
        }
    }

    pub async fn search_domestic(&self, text: &str) -> Result<FinalAnswer> {
        self.search_cases(CollectionKind::Domestic, text, CancellationToken::new()).await
    }

    pub async fn search_overseas(&self, text: &str) -> Result<FinalAnswer> {
        self.search_cases(CollectionKind::Overseas, text, CancellationToken::new()).await
    }

    /// Rank a case collection, split the top hits into groups, analyse each
    /// group and consolidate. Cancelling `cancel` abandons the analysis.
    pub async fn search_cases(&self, kind: CollectionKind, text: &str, cancel: CancellationToken) -> Result<FinalAnswer> {
        let index = self.handle_for(kind).current()?;
        if text.trim().is_empty() {
            return Ok(FinalAnswer::empty(Audit::Groups(Vec::new())));
        }

        let candidates: Vec<RankedCandidate> = index.matches(text, self.settings.search.top_k);
        tracing::debug!(collection = %kind, candidates = candidates.len(), "cases ranked");

        let partitions: Vec<Partition<Document>> = partition(&candidates, self.settings.search.group_count)
            .into_iter()
            .map(|p| p.filter_map(|c| index.document(&c.id).cloned()))
            .collect();
        let verdicts = self.dispatcher.dispatch_until(text, partitions, self.analyst.clone(), cancel).await?;
        let answer = self.consolidator.groups(verdicts);
        tracing::info!(collection = %kind, outcome = ?answer.outcome, "case search finished");
        Ok(answer)
    }

    /// Tariff-table similarity and manual n-gram search run side by side,
    /// blended into code-level candidates.
    pub async fn fuse_manual_search(&self, text: &str) -> Result<FinalAnswer> {
        let manual_index = self.manual.current()?;
        if text.trim().is_empty() {
            return Ok(FinalAnswer::empty(Audit::Fusion(Vec::new())));
        }
        let table: Arc<dyn PathRanker> = Arc::new(TariffPath { table: self.table(), manual: manual_index.clone() });
        let manual: Arc<dyn PathRanker> = Arc::new(ManualRanker::new(manual_index));
        let report = self.fusion.fuse(text, table, manual).await;
        let all_failed = report.all_paths_failed();
        let answer = self.consolidator.fused(report.candidates, all_failed, self.settings.fusion.max_candidates);
        tracing::info!(outcome = ?answer.outcome, "fusion search finished");
        Ok(answer)
    }

    /// Build a dossier for each named code and have the analysis step
    /// compare them in one pass, with the general interpretation rules
    /// alongside.
    pub async fn analyze_manual(&self, question: &str, codes: &[String]) -> Result<ManualComparison> {
        let mut wanted: Vec<&String> = Vec::new();
        for code in codes {
            let d = digits(code);
            if d.len() >= 4 && !wanted.iter().any(|w| digits(w) == d) {
                wanted.push(code);
            }
        }
        if wanted.is_empty() {
            return Err(Error::NotFound("no HS code to analyse".into()));
        }

        let manual_index = self.manual.current()?;
        let book = ManualBook::new(manual_index.collection());
        let table = self.table();
        let dossiers: Vec<CodeDossier> = wanted
            .iter()
            .map(|code| {
                let tariff: Option<TariffEntry> = table.lookup(code).cloned();
                CodeDossier::new(code, tariff, book.lookup(code), self.settings.manual.excerpt_chars)
            })
            .collect();
        tracing::debug!(codes = dossiers.len(), "dossiers prepared");

        let mut documents: Vec<Document> = dossiers.iter().map(CodeDossier::to_document).collect();
        documents.extend(general_rules_document(&self.rules(), self.settings.manual.general_rules));
        let verdicts = self
            .dispatcher
            .dispatch(question, vec![Partition { group: 0, items: documents }], self.analyst.clone())
            .await?;
        Ok(ManualComparison { question: question.to_string(), dossiers, answer: self.consolidator.groups(verdicts) })
    }

    /// Manual explanations for every code named in `text`.
    pub fn manual_raw(&self, text: &str) -> Result<Vec<ManualEntry>> {
        let codes = extract_codes(text);
        if codes.is_empty() {
            return Err(Error::NotFound("no HS code in the request".into()));
        }
        let index = self.manual.current()?;
        let book = ManualBook::new(index.collection());
        Ok(codes.iter().filter_map(|c| book.lookup(c)).filter(|e| !e.is_empty()).collect())
    }

    pub fn lookup_domestic(&self, text: &str, k: usize) -> Result<Vec<CaseHit>> {
        self.lookup_cases(CollectionKind::Domestic, text, k)
    }

    pub fn lookup_overseas(&self, text: &str, k: usize) -> Result<Vec<CaseHit>> {
        self.lookup_cases(CollectionKind::Overseas, text, k)
    }

    /// Ranked cases themselves. A case whose reference number appears in
    /// `text` is listed first with score 1.
    pub fn lookup_cases(&self, kind: CollectionKind, text: &str, k: usize) -> Result<Vec<CaseHit>> {
        let index = self.handle_for(kind).current()?;
        let needle = text.to_lowercase();
        let mut hits: Vec<CaseHit> = index
            .collection()
            .documents()
            .iter()
            .filter(|d| d.attribute(ATTR_REFERENCE).is_some_and(|r| r.chars().count() >= 4 && needle.contains(&r.to_lowercase())))
            .map(|d| CaseHit {
                candidate: RankedCandidate { id: d.id.clone(), score: 1.0, source: kind },
                document: d.clone(),
            })
            .collect();
        for candidate in index.query(text, k) {
            if hits.len() >= k { break; }
            if hits.iter().any(|h| h.candidate.id == candidate.id) { continue; }
            if let Some(document) = index.document(&candidate.id).cloned() {
                hits.push(CaseHit { candidate, document });
            }
        }
        hits.truncate(k);
        Ok(hits)
    }

    fn handle_for(&self, kind: CollectionKind) -> &IndexHandle {
        match kind {
            CollectionKind::Domestic => &self.domestic,
            CollectionKind::Overseas => &self.overseas,
            CollectionKind::Manual => &self.manual,
        }
    }

    fn rules(&self) -> Arc<Vec<String>> {
        match self.general_rules.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn table(&self) -> Arc<TableSimilarityRanker> {
        match self.tariff.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
