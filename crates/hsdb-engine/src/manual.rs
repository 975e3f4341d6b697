//! Lookups into the explanatory manual by HS code, and the per-code dossiers
//! handed to the analysis step when a user names candidate codes.

use serde::Serialize;

use hsdb_core::codes::{digits, header_codes};
use hsdb_core::types::{Collection, Document, TariffEntry, ATTR_CODE};
use hsdb_core::verdict::FinalAnswer;

/// Part (부), chapter (류) and heading (호) explanations for one code.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ManualEntry {
    pub code: String,
    pub part: Option<Document>,
    pub chapter: Option<Document>,
    pub heading: Option<Document>,
}

impl ManualEntry {
    pub fn is_empty(&self) -> bool { self.part.is_none() && self.chapter.is_none() && self.heading.is_none() }

    /// The three explanations as one labelled text block.
    pub fn text(&self) -> String {
        [("Part", &self.part), ("Chapter", &self.chapter), ("Heading", &self.heading)]
            .iter()
            .filter_map(|(label, doc)| doc.as_ref().map(|d| format!("{label}: {}", section_text(d))))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn section_text(doc: &Document) -> &str { doc.attribute("text").unwrap_or(&doc.body) }

pub struct ManualBook<'a> {
    sections: &'a Collection,
}

impl<'a> ManualBook<'a> {
    pub fn new(sections: &'a Collection) -> Self { Self { sections } }

    /// `None` when the code is shorter than a heading.
    pub fn lookup(&self, code: &str) -> Option<ManualEntry> {
        let d = digits(code);
        if d.len() < 4 { return None; }
        let chapter_key = format!("{}00", &d[..2]);
        let heading_key = d[..4].to_string();

        let chapter = self.find(|h| h.contains('류') && header_codes(h).contains(&chapter_key));
        let heading = self.find(|h| header_codes(h).contains(&heading_key));
        let part = chapter.as_ref().and_then(|c| c.attribute("header1")).and_then(|part_header| {
            let in_part = |doc: &&Document| doc.attribute("header1") == Some(part_header);
            self.sections
                .documents()
                .iter()
                .filter(in_part)
                .find(|doc| doc.attribute("header2").map_or(true, |h| header_codes(h).is_empty()))
                .or_else(|| self.sections.documents().iter().find(in_part))
                .cloned()
        });
        Some(ManualEntry { code: code.to_string(), part, chapter, heading })
    }

    fn find(&self, pred: impl Fn(&str) -> bool) -> Option<Document> {
        self.sections
            .documents()
            .iter()
            .find(|doc| doc.attribute("header2").is_some_and(&pred))
            .cloned()
    }
}

/// Everything known about one candidate code.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CodeDossier {
    pub code: String,
    pub tariff: Option<TariffEntry>,
    pub manual: Option<ManualEntry>,
    pub excerpt: String,
}

impl CodeDossier {
    pub fn new(code: &str, tariff: Option<TariffEntry>, manual: Option<ManualEntry>, excerpt_chars: usize) -> Self {
        let full = manual.as_ref().map(ManualEntry::text).unwrap_or_default();
        Self { code: code.to_string(), tariff, manual, excerpt: excerpt(&full, excerpt_chars) }
    }

    /// The dossier as a document the analysis step can read.
    pub fn to_document(&self) -> Document {
        let mut body = self.code.clone();
        if let Some(t) = &self.tariff {
            body.push_str(&format!(" {} / {} ({})", t.name_ko, t.name_en, t.code));
        }
        if !self.excerpt.is_empty() {
            body.push('\n');
            body.push_str(&self.excerpt);
        }
        Document::new(format!("dossier:{}", self.code), body).with_attribute(ATTR_CODE, self.code.as_str())
    }
}

/// The leading `limit` general interpretation rules as one numbered document,
/// `None` when there are none to attach.
pub fn general_rules_document(rules: &[String], limit: usize) -> Option<Document> {
    let numbered: Vec<String> = rules
        .iter()
        .take(limit)
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| format!("통칙 {}: {}", i + 1, text.trim()))
        .collect();
    if numbered.is_empty() { return None; }
    Some(Document::new(GENERAL_RULES_ID, format!("HS 분류 통칙:\n\n{}", numbered.join("\n\n"))))
}

pub const GENERAL_RULES_ID: &str = "general-rules";

/// Result of comparing user-named codes against the manual.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ManualComparison {
    pub question: String,
    pub dossiers: Vec<CodeDossier>,
    pub answer: FinalAnswer,
}

/// First `max` characters, with an ellipsis when anything was cut.
pub fn excerpt(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsdb_core::types::CollectionKind;

    fn section(id: &str, h1: &str, h2: &str, text: &str) -> Document {
        Document::new(id, format!("{h1} {h2} {text}"))
            .with_attribute("header1", h1)
            .with_attribute("header2", h2)
            .with_attribute("text", text)
    }

    fn manual() -> Collection {
        Collection::new(
            CollectionKind::Manual,
            vec![
                section("s0", "제20부 잡품", "총설", "이 부는 가구와 조명기구 등을 포함한다"),
                section("s1", "제20부 잡품", "제94류", "가구, 침구, 조명기구"),
                section("s2", "제20부 잡품", "94.03", "그 밖의 가구"),
                section("s3", "제20부 잡품", "94.05", "조명기구와 그 부분품"),
                section("s4", "제11부 방직용 섬유", "제61류", "편물제 의류"),
            ],
        )
    }

    #[test]
    fn finds_part_chapter_and_heading() {
        let collection = manual();
        let entry = ManualBook::new(&collection).lookup("9405.21-1000").unwrap();
        assert_eq!(entry.part.as_ref().map(|d| d.id.as_str()), Some("s0"));
        assert_eq!(entry.chapter.as_ref().map(|d| d.id.as_str()), Some("s1"));
        assert_eq!(entry.heading.as_ref().map(|d| d.id.as_str()), Some("s3"));
        assert!(entry.text().starts_with("Part: 이 부는"));
    }

    #[test]
    fn missing_heading_still_reports_the_chapter() {
        let collection = manual();
        let entry = ManualBook::new(&collection).lookup("6110").unwrap();
        assert!(entry.heading.is_none());
        assert_eq!(entry.chapter.as_ref().map(|d| d.id.as_str()), Some("s4"));
        assert!(ManualBook::new(&collection).lookup("61").is_none());
    }

    #[test]
    fn general_rules_keep_their_numbers() {
        let rules: Vec<String> = ["표제는 참조용", "", "구체적인 호 우선", "일곱째"].iter().map(|s| s.to_string()).collect();
        let doc = general_rules_document(&rules, 3).unwrap();
        assert_eq!(doc.id, GENERAL_RULES_ID);
        assert_eq!(doc.body, "HS 분류 통칙:\n\n통칙 1: 표제는 참조용\n\n통칙 3: 구체적인 호 우선");
        assert!(doc.code().is_none());
        assert!(general_rules_document(&rules, 0).is_none());
        assert!(general_rules_document(&[], 6).is_none());
    }

    #[test]
    fn excerpt_counts_characters() {
        assert_eq!(excerpt("조명기구", 2), "조명...");
        assert_eq!(excerpt("조명", 2), "조명");
    }
}
