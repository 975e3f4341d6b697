//! Reads the JSON knowledge directory into read-only collections.
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codes::header_codes;
use crate::types::{Collection, CollectionKind, Document, TariffEntry, ATTR_CODE, ATTR_REFERENCE, ATTR_SOURCE};

const DOMESTIC_PART_PREFIX: &str = "HS분류사례_part";
const DOMESTIC_EXTRA: [&str; 2] = ["HS위원회", "HS협의회"];
const OVERSEAS_SOURCES: [&str; 2] = ["hs_classification_data_us", "hs_classification_data_eu"];
const MANUAL_SOURCE: &str = "grouped_11_end";
const TARIFF_SOURCE: &str = "hstable";
const GENERAL_RULES_SOURCE: &str = "통칙_grouped";

/// Everything the engine needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub domestic: Collection,
    pub overseas: Collection,
    pub manual: Collection,
    pub tariff: Vec<TariffEntry>,
    /// General interpretation rules in order, rule 1 first.
    pub general_rules: Vec<String>,
}

#[derive(Default)]
pub struct KnowledgeLoader;

impl KnowledgeLoader {
    pub fn new() -> Self { Self }

    /// Load every known file under `dir`. Missing files are skipped with a
    /// warning; unreadable or malformed files are errors.
    pub fn load_dir(&self, dir: &Path) -> Result<KnowledgeBase> {
        let files = self.list_json_files(dir);
        if files.is_empty() {
            tracing::warn!(dir = %dir.display(), "no .json files found");
        }

        let mut parts: Vec<(u32, &PathBuf)> = files
            .iter()
            .filter_map(|(stem, path)| {
                stem.strip_prefix(DOMESTIC_PART_PREFIX).and_then(|n| n.parse().ok()).map(|n| (n, path))
            })
            .collect();
        parts.sort_by_key(|(n, _)| *n);

        let mut ids = HashSet::new();
        let mut domestic = Vec::new();
        for (n, path) in parts {
            let source = format!("{DOMESTIC_PART_PREFIX}{n}");
            domestic.extend(self.case_documents(&source, self.read_array(path)?, &mut ids));
        }
        for source in DOMESTIC_EXTRA {
            match files.get(source) {
                Some(path) => domestic.extend(self.case_documents(source, self.read_array(path)?, &mut ids)),
                None => tracing::warn!(source, "knowledge file not found"),
            }
        }

        let mut ids = HashSet::new();
        let mut overseas = Vec::new();
        for source in OVERSEAS_SOURCES {
            match files.get(source) {
                Some(path) => overseas.extend(self.case_documents(source, self.read_array(path)?, &mut ids)),
                None => tracing::warn!(source, "knowledge file not found"),
            }
        }

        let manual = match files.get(MANUAL_SOURCE) {
            Some(path) => self.manual_documents(self.read_array(path)?),
            None => { tracing::warn!(source = MANUAL_SOURCE, "knowledge file not found"); Vec::new() }
        };
        let tariff = match files.get(TARIFF_SOURCE) {
            Some(path) => self.tariff_entries(self.read_array(path)?),
            None => { tracing::warn!(source = TARIFF_SOURCE, "knowledge file not found"); Vec::new() }
        };

        let general_rules = match files.get(GENERAL_RULES_SOURCE) {
            Some(path) => self
                .read_array(path)?
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(text_field(&map, "text").unwrap_or_default()),
                    _ => None,
                })
                .collect(),
            None => { tracing::warn!(source = GENERAL_RULES_SOURCE, "knowledge file not found"); Vec::new() }
        };

        let kb = KnowledgeBase {
            domestic: Collection::new(CollectionKind::Domestic, domestic),
            overseas: Collection::new(CollectionKind::Overseas, overseas),
            manual: Collection::new(CollectionKind::Manual, manual),
            tariff,
            general_rules,
        };
        tracing::info!(
            domestic = kb.domestic.len(),
            overseas = kb.overseas.len(),
            manual = kb.manual.len(),
            tariff = kb.tariff.len(),
            rules = kb.general_rules.len(),
            "knowledge loaded"
        );
        Ok(kb)
    }

    fn read_array(&self, path: &Path) -> Result<Vec<Value>> {
        let raw = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => String::from_utf8_lossy(&fs::read(path).with_context(|| format!("reading {}", path.display()))?).to_string(),
        };
        let value: Value = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        match value {
            Value::Array(items) => Ok(items),
            other => anyhow::bail!("{}: expected a JSON array, found {}", path.display(), json_kind(&other)),
        }
    }

    /// Case records become documents whose body is the product name,
    /// description and reasoning joined by spaces.
    fn case_documents(&self, source: &str, items: Vec<Value>, ids: &mut HashSet<String>) -> Vec<Document> {
        let mut docs = Vec::with_capacity(items.len());
        for (n, item) in items.into_iter().enumerate() {
            let Value::Object(map) = item else { continue };
            let body = ["product_name", "description", "decision_reason", "reply"]
                .iter()
                .filter_map(|k| text_field(&map, k))
                .collect::<Vec<_>>()
                .join(" ");
            if body.trim().is_empty() { continue; }

            let mut attributes = scalar_fields(&map);
            if let Some(code) = text_field(&map, "HS코드") {
                attributes.entry(ATTR_CODE.to_string()).or_insert(code);
            }
            attributes.insert(ATTR_SOURCE.to_string(), source.to_string());

            let id = match attributes.get(ATTR_REFERENCE) {
                Some(r) if !r.trim().is_empty() && !ids.contains(r.trim()) => r.trim().to_string(),
                _ => format!("{source}#{n}"),
            };
            ids.insert(id.clone());
            docs.push(Document { id, body, attributes });
        }
        tracing::debug!(source, count = docs.len(), "case documents loaded");
        docs
    }

    fn manual_documents(&self, items: Vec<Value>) -> Vec<Document> {
        let mut docs = Vec::with_capacity(items.len());
        for (n, item) in items.into_iter().enumerate() {
            let Value::Object(map) = item else { continue };
            let header1 = text_field(&map, "header1").unwrap_or_default();
            let header2 = text_field(&map, "header2").unwrap_or_default();
            let text = text_field(&map, "text").unwrap_or_default();
            let body = [header1.as_str(), header2.as_str(), text.as_str()].join(" ");
            if body.trim().is_empty() { continue; }

            let mut doc = Document::new(format!("{MANUAL_SOURCE}#{n}"), body)
                .with_attribute("header1", header1)
                .with_attribute("header2", header2.clone())
                .with_attribute("text", text)
                .with_attribute(ATTR_SOURCE, MANUAL_SOURCE);
            if let Some(code) = header_codes(&header2).into_iter().next() {
                doc = doc.with_attribute(ATTR_CODE, code);
            }
            docs.push(doc);
        }
        docs
    }

    fn tariff_entries(&self, items: Vec<Value>) -> Vec<TariffEntry> {
        items
            .into_iter()
            .filter_map(|item| {
                let Value::Object(map) = item else { return None };
                let code = text_field(&map, "품목번호")?;
                Some(TariffEntry {
                    code,
                    name_ko: text_field(&map, "한글품명").unwrap_or_default(),
                    name_en: text_field(&map, "영문품명").unwrap_or_default(),
                })
            })
            .collect()
    }

    fn list_json_files(&self, root: &Path) -> BTreeMap<String, PathBuf> {
        let mut files = BTreeMap::new();
        for entry in walkdir::WalkDir::new(root).max_depth(2).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") { continue; }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.entry(stem.to_string()).or_insert_with(|| path.to_path_buf());
            }
        }
        files
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_fields(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.keys().filter_map(|k| text_field(map, k).map(|v| (k.clone(), v))).collect()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
