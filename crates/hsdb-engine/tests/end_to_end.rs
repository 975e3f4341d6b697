use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hsdb_core::config::Settings;
use hsdb_core::data_processor::KnowledgeBase;
use hsdb_core::error::Error;
use hsdb_core::events::EngineEvent;
use hsdb_core::traits::AnalysisStep;
use hsdb_core::types::{Collection, CollectionKind, Confidence, Document, TariffEntry, ATTR_CODE, ATTR_REFERENCE};
use hsdb_core::verdict::{Analysis, Outcome};
use hsdb_dispatch::FrequencyAnalyst;
use hsdb_engine::{Engine, QueryKind, Response};

struct Offline;

#[async_trait]
impl AnalysisStep for Offline {
    async fn analyze(&self, _query: &str, _documents: &[Document]) -> anyhow::Result<Analysis> {
        anyhow::bail!("analysis service unreachable")
    }
}

/// Keeps every document it is shown.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Document>>,
}

#[async_trait]
impl AnalysisStep for Recorder {
    async fn analyze(&self, query: &str, documents: &[Document]) -> anyhow::Result<Analysis> {
        self.seen.lock().unwrap().extend_from_slice(documents);
        FrequencyAnalyst.analyze(query, documents).await
    }
}

fn case(id: &str, body: &str, code: &str) -> Document {
    Document::new(id, body).with_attribute(ATTR_CODE, code)
}

fn section(id: &str, h1: &str, h2: &str, text: &str, code: Option<&str>) -> Document {
    let doc = Document::new(id, format!("{h1} {h2} {text}"))
        .with_attribute("header1", h1)
        .with_attribute("header2", h2)
        .with_attribute("text", text);
    match code {
        Some(code) => doc.with_attribute(ATTR_CODE, code),
        None => doc,
    }
}

fn knowledge(domestic: Vec<Document>) -> KnowledgeBase {
    let entry = |code: &str, ko: &str, en: &str| TariffEntry { code: code.into(), name_ko: ko.into(), name_en: en.into() };
    KnowledgeBase {
        domestic: Collection::new(CollectionKind::Domestic, domestic),
        overseas: Collection::empty(CollectionKind::Overseas),
        manual: Collection::new(
            CollectionKind::Manual,
            vec![
                section("s0", "제20부 잡품", "총설", "miscellaneous manufactured articles", None),
                section("s1", "제20부 잡품", "제94류", "furniture bedding lamps and lighting fittings", Some("9400")),
                section("s2", "제20부 잡품", "94.05", "ceiling lighting fittings, lamps and lighting fittings", Some("9405")),
                section("s3", "제20부 잡품", "94.03", "other furniture and parts thereof", Some("9403")),
                section("s4", "제11부 방직용 섬유", "제61류", "articles of apparel knitted", Some("6100")),
                section("s5", "제11부 방직용 섬유", "61.10", "jerseys pullovers cardigans knitted", Some("6110")),
            ],
        ),
        tariff: vec![
            entry("9405.11-0000", "샹들리에와 천장용 조명기구", "Chandeliers and other electric ceiling lighting fittings"),
            entry("6110.20-0000", "면제 스웨터", "Jerseys, pullovers of cotton"),
            entry("7324.10-0000", "스테인리스강제 싱크대", "Sinks and wash basins of stainless steel"),
        ],
        general_rules: vec!["표제는 참조의 편의를 위한 것이다".into(), "가장 구체적으로 표현된 호로 분류한다".into()],
    }
}

fn engine(domestic: Vec<Document>) -> Engine {
    Engine::new(knowledge(domestic), Settings::default(), Arc::new(FrequencyAnalyst)).unwrap()
}

fn compound_cases() -> Vec<Document> {
    vec![
        case("a", "폴리우레탄폼 매트리스 제품", "9404.21"),
        case("b", "폴리우레탄 매트리스 제품", "3921.13"),
        case("c", "스테인리스 주방 싱크대", "7324.10"),
        case("d", "면 니트 스웨터", "6110.20"),
        case("e", "LED 천장 조명", "9405.11"),
    ]
}

#[tokio::test]
async fn fourteen_agreeing_cases_give_a_high_answer() {
    let cases = (0..14).map(|i| case(&format!("case-{i:02}"), &format!("LED 천장 조명기구 패널형 모델 {i}"), "9405.21")).collect();
    let engine = engine(cases);
    let mut rx = engine.events().subscribe();

    let answer = engine.search_domestic("LED 천장 조명기구").await.unwrap();
    assert_eq!(answer.outcome, Outcome::Answer { code: "9405.21".into(), confidence: Confidence::High });
    let top = answer.leading().unwrap();
    assert_eq!(top.support, 14);
    assert_eq!(top.confidence, Confidence::High);

    let sizes: Vec<usize> = answer.verdicts().iter().map(|v| v.documents).collect();
    assert_eq!(sizes, vec![3, 3, 3, 3, 2]);

    let mut started = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, EngineEvent::GroupStarted { .. }) {
            started += 1;
        }
    }
    assert_eq!(started, 5);
}

#[tokio::test]
async fn exact_compound_term_ranks_above_its_stem() {
    let engine = engine(compound_cases());
    let hits = engine.lookup_domestic("폴리우레탄폼", 5).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.candidate.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(hits[0].candidate.score > hits[1].candidate.score);

    let answer = engine.search_domestic("폴리우레탄폼").await.unwrap();
    assert_eq!(answer.leading().map(|e| e.code.as_str()), Some("9404.21"));
    assert_eq!(answer.confidence(), Some(Confidence::Medium));
}

#[tokio::test]
async fn a_single_matching_case_is_not_lost() {
    let engine = engine(vec![case("a", "폴리우레탄폼 매트리스", "9404.21"), case("b", "스테인리스 싱크대", "7324.10")]);
    let answer = engine.search_domestic("폴리우레탄폼").await.unwrap();
    assert_eq!(answer.outcome, Outcome::Answer { code: "9404.21".into(), confidence: Confidence::Medium });
    assert_eq!(answer.leading().map(|e| e.support), Some(1));
}

#[tokio::test]
async fn compound_case_leads_even_with_the_later_id() {
    let engine = engine(vec![case("z", "폴리우레탄폼 매트리스", "9404.21"), case("a", "폴리우레탄 매트리스", "3921.13")]);
    let hits = engine.lookup_domestic("폴리우레탄폼", 2).unwrap();
    assert_eq!(hits.iter().map(|h| h.candidate.id.as_str()).collect::<Vec<_>>(), vec!["z", "a"]);

    let answer = engine.search_domestic("폴리우레탄폼").await.unwrap();
    assert_eq!(answer.leading().map(|e| e.code.as_str()), Some("9404.21"));
}

#[tokio::test]
async fn blank_query_is_empty_not_an_error() {
    let engine = engine(compound_cases());
    let answer = engine.search_domestic("   ").await.unwrap();
    assert_eq!(answer.outcome, Outcome::Empty);
    assert!(answer.ranking.is_empty());

    let answer = engine.search_overseas("폴리우레탄폼").await.unwrap();
    assert_eq!(answer.outcome, Outcome::Empty);
}

#[tokio::test]
async fn analysis_outage_is_reported_as_unavailable() {
    let engine = Engine::new(knowledge(compound_cases()), Settings::default(), Arc::new(Offline)).unwrap();
    let answer = engine.search_domestic("폴리우레탄폼").await.unwrap();
    assert_eq!(answer.outcome, Outcome::Unavailable);
    assert!(answer.leading().is_none());
    assert_eq!(answer.verdicts().iter().filter(|v| v.is_degraded()).count(), 2);
}

#[tokio::test]
async fn queries_wait_for_the_first_load() {
    let engine = Engine::unloaded(Settings::default(), Arc::new(FrequencyAnalyst)).unwrap();
    assert!(matches!(engine.search_domestic("폴리우레탄폼").await, Err(Error::IndexUnavailable(_))));
    assert!(matches!(engine.fuse_manual_search("lamp").await, Err(Error::IndexUnavailable(_))));

    engine.reload(knowledge(compound_cases()));
    let answer = engine.search_domestic("폴리우레탄폼").await.unwrap();
    assert!(matches!(answer.outcome, Outcome::Answer { .. }));
}

#[tokio::test]
async fn fusion_agrees_across_table_and_manual() {
    let engine = engine(Vec::new());
    let answer = engine.fuse_manual_search("ceiling lighting fittings").await.unwrap();
    assert_eq!(answer.outcome, Outcome::Answer { code: "9405".into(), confidence: Confidence::High });
    assert!(answer.ranking.len() <= 2);
    let top = &answer.fused()[0];
    assert!(top.in_both_paths());
    assert_eq!(top.table_name.as_deref(), Some("샹들리에와 천장용 조명기구"));
}

#[tokio::test]
async fn tariff_codes_without_manual_text_are_left_out() {
    let engine = engine(Vec::new());
    let answer = engine.fuse_manual_search("sinks and wash basins of stainless steel").await.unwrap();
    assert!(answer.fused().iter().all(|c| c.code != "7324"));
    assert!(answer.fused().iter().all(|c| c.table_score.is_none() || c.code == "6110" || c.code == "9405"));
}

#[tokio::test]
async fn user_named_codes_are_compared_from_dossiers() {
    let engine = engine(Vec::new());
    let response = engine.handle(QueryKind::ManualWithCodes, "9405 와 9403 중 어느 쪽인가요").await.unwrap();
    let Response::Comparison(comparison) = response else { panic!("expected a comparison") };

    assert_eq!(comparison.dossiers.len(), 2);
    let lamp = &comparison.dossiers[0];
    assert_eq!(lamp.code, "9405");
    assert_eq!(lamp.tariff.as_ref().map(|t| t.code.as_str()), Some("9405.11-0000"));
    assert!(lamp.excerpt.contains("ceiling lighting fittings"));
    assert!(comparison.dossiers[1].tariff.is_none());
    assert_eq!(comparison.answer.ranking.len(), 2);
    let verdict = &comparison.answer.verdicts()[0];
    assert_eq!(verdict.documents, 3, "two dossiers and the general rules");

    let missing = engine.handle(QueryKind::ManualWithCodes, "어느 호로 분류되나요").await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn code_comparison_reads_the_general_rules() {
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::new(knowledge(Vec::new()), Settings::default(), recorder.clone()).unwrap();
    engine.analyze_manual("조명기구인가 가구인가", &["9405".into(), "9403".into()]).await.unwrap();

    let seen = recorder.seen.lock().unwrap();
    let rules = seen.iter().find(|d| d.id == "general-rules").expect("rules document handed over");
    assert!(rules.body.starts_with("HS 분류 통칙:"));
    assert!(rules.body.contains("통칙 2: 가장 구체적으로 표현된 호로 분류한다"));
    assert_eq!(seen.iter().filter(|d| d.code().is_some()).count(), 2);
}

#[tokio::test]
async fn raw_manual_lookup_returns_all_three_levels() {
    let engine = engine(Vec::new());
    let Response::Manual(entries) = engine.handle(QueryKind::ManualRaw, "9405.21 해설 보여줘").await.unwrap() else {
        panic!("expected manual entries")
    };
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.part.as_ref().map(|d| d.id.as_str()), Some("s0"));
    assert_eq!(entry.chapter.as_ref().map(|d| d.id.as_str()), Some("s1"));
    assert_eq!(entry.heading.as_ref().map(|d| d.id.as_str()), Some("s2"));
}

#[test]
fn reference_number_in_the_query_pins_that_case() {
    let mut cases = compound_cases();
    cases.push(case("품목분류2과-9433", "가죽제 신발 갑피", "6403.99").with_attribute(ATTR_REFERENCE, "품목분류2과-9433"));
    let engine = engine(cases);
    let hits = engine.lookup_domestic("품목분류2과-9433 사례의 폴리우레탄폼", 3).unwrap();
    assert_eq!(hits[0].candidate.id, "품목분류2과-9433");
    assert_eq!(hits[0].candidate.score, 1.0);
    assert_eq!(hits[1].candidate.id, "a");
}

#[tokio::test]
async fn engine_loads_a_knowledge_directory() {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, value: serde_json::Value| std::fs::write(dir.path().join(name), value.to_string()).unwrap();
    write(
        "HS분류사례_part1.json",
        serde_json::json!([
            {"reference_id": "품목분류1과-1001", "product_name": "폴리우레탄폼 매트리스", "description": "침대용", "HS코드": "9404.21"},
            {"reference_id": "품목분류1과-1002", "product_name": "스테인리스 싱크대", "description": "주방용", "HS코드": "7324.10"}
        ]),
    );
    write(
        "grouped_11_end.json",
        serde_json::json!([
            {"header1": "제20부 잡품", "header2": "제94류", "text": "furniture bedding mattresses"},
            {"header1": "제20부 잡품", "header2": "94.04", "text": "mattress supports and mattresses"}
        ]),
    );
    write("hstable.json", serde_json::json!([{"품목번호": "9404.21-0000", "한글품명": "매트리스", "영문품명": "Mattresses"}]));

    let engine = Engine::from_dir(dir.path(), Settings::default(), Arc::new(FrequencyAnalyst)).unwrap();
    let hits = engine.lookup_domestic("폴리우레탄폼 매트리스", 1).unwrap();
    assert_eq!(hits[0].document.id, "품목분류1과-1001");

    let answer = engine.fuse_manual_search("mattresses").await.unwrap();
    assert_eq!(answer.leading().map(|e| e.code.as_str()), Some("9404"));
}
