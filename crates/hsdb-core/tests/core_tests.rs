use std::fs;
use tempfile::TempDir;

use hsdb_core::config::{Config, Settings};
use hsdb_core::data_processor::KnowledgeLoader;
use hsdb_core::types::{CollectionKind, ATTR_CODE, ATTR_SOURCE};

#[test]
fn load_dir_builds_all_collections() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(
        dir.join("HS분류사례_part1.json"),
        r#"[{"reference_id":"품목분류2과-9433","product_name":"LED 조명기구","description":"천장 설치용","decision_reason":"제94.05호 분류","hs_code":"9405.11"},
            {"product_name":"","description":""}]"#,
    )
    .unwrap();
    fs::write(dir.join("HS위원회.json"), r#"[{"product_name":"폴리우레탄폼 매트","hs_code":"9404.29"}]"#).unwrap();
    fs::write(
        dir.join("hs_classification_data_us.json"),
        r#"[{"reference_id":"NY N338825","product_name":"rubber sole footwear","reply":"classified in 6402","hs_code":"6402.99"}]"#,
    )
    .unwrap();
    fs::write(
        dir.join("grouped_11_end.json"),
        r#"[{"header1":"제20부","header2":"제94류","text":"가구 조명기구"},{"header1":"제20부","header2":"94.05","text":"조명기구"}]"#,
    )
    .unwrap();
    fs::write(dir.join("hstable.json"), r#"[{"품목번호":"9405.11-1000","한글품명":"샹들리에","영문품명":"Chandeliers"}]"#).unwrap();
    fs::write(
        dir.join("통칙_grouped.json"),
        r#"[{"header1":"통칙 1","text":"표제는 참조의 편의를 위한 것이다"},{"header1":"통칙 2","text":""},{"header1":"통칙 3","text":"가장 구체적으로 표현된 호"}]"#,
    )
    .unwrap();

    let kb = KnowledgeLoader::new().load_dir(dir).expect("load");

    assert_eq!(kb.domestic.kind(), CollectionKind::Domestic);
    assert_eq!(kb.domestic.len(), 2, "blank case is skipped");
    let case = kb.domestic.get("품목분류2과-9433").expect("reference id becomes the document id");
    assert_eq!(case.code(), Some("9405.11"));
    assert_eq!(case.attribute(ATTR_SOURCE), Some("HS분류사례_part1"));
    assert!(case.body.contains("LED 조명기구"));
    assert!(kb.domestic.get("HS위원회#0").is_some(), "cases without reference id get a positional id");

    assert_eq!(kb.overseas.len(), 1);
    assert!(kb.overseas.get("NY N338825").expect("us case").body.contains("classified in 6402"));

    assert_eq!(kb.manual.len(), 2);
    let codes: Vec<_> = kb.manual.documents().iter().filter_map(|d| d.attribute(ATTR_CODE)).collect();
    assert_eq!(codes, ["9400", "9405"]);

    assert_eq!(kb.tariff.len(), 1);
    assert_eq!(kb.tariff[0].name_en, "Chandeliers");

    assert_eq!(kb.general_rules, ["표제는 참조의 편의를 위한 것이다", "", "가장 구체적으로 표현된 호"], "rules keep their position");
}

#[test]
fn missing_files_yield_empty_collections() {
    let tmp = TempDir::new().unwrap();
    let kb = KnowledgeLoader::new().load_dir(tmp.path()).expect("load");
    assert!(kb.domestic.is_empty());
    assert!(kb.overseas.is_empty());
    assert!(kb.manual.is_empty());
    assert!(kb.tariff.is_empty());
    assert!(kb.general_rules.is_empty());
}

#[test]
fn malformed_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("hstable.json"), r#"{"not":"an array"}"#).unwrap();
    assert!(KnowledgeLoader::new().load_dir(tmp.path()).is_err());
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[dispatch]\nmax_concurrency = 2\n\n[fusion]\nmax_candidates = 4\n",
    )
    .unwrap();
    let settings = Config::load_from(tmp.path()).expect("config").settings().expect("settings");
    assert_eq!(settings.dispatch.max_concurrency, 2);
    assert_eq!(settings.fusion.max_candidates, 4);
    assert_eq!(settings.search.group_count, 5, "untouched keys keep their defaults");
    let workers: usize = Config::load_from(tmp.path()).unwrap().get("dispatch.max_concurrency").unwrap();
    assert_eq!(workers, 2);
}

#[test]
fn validation_rejects_bad_weights_and_zero_groups() {
    let mut s = Settings::default();
    assert!(s.validate().is_ok());
    s.fusion.table_weight = 0.5;
    assert!(s.validate().is_err(), "weights must sum to one");
    let mut s = Settings::default();
    s.search.group_count = 0;
    assert!(s.validate().is_err());
}
