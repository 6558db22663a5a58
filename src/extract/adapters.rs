//! Schema adapters for the two supported dataset families.
//!
//! Each family stores its referenced page titles in a different place, so
//! the extractor dispatches through a closed [`RecordAdapter`] enum instead
//! of probing fields ad hoc. Adding a family means adding a variant and its
//! record type here — nothing else in the pipeline changes.

use serde::Deserialize;

use crate::titles::normalize_storage;

/// A link object inside a linked-context record. The referenced title lives
/// in `target`, with `page` as the legacy fallback field.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

impl Link {
    /// First non-empty of `target` / `page`.
    fn referenced_title(&self) -> Option<&str> {
        [self.target.as_deref(), self.page.as_deref()]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
    }
}

/// A record from the linked-context family (IIRC-style): the document's own
/// title plus a list of outgoing links. Only link targets are extracted;
/// the host title is deliberately not an identifier source.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkedRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// One supporting paragraph of a paragraph-list record.
#[derive(Debug, Clone, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub paragraph_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_supporting: Option<bool>,
}

impl Paragraph {
    /// First non-empty of the known body fields.
    pub fn body(&self) -> Option<&str> {
        [
            self.paragraph_text.as_deref(),
            self.text.as_deref(),
            self.content.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
    }
}

/// A record from the paragraph-list family (MuSiQue-style): an example id
/// plus the paragraphs retrieved for it.
#[derive(Debug, Clone, Deserialize)]
pub struct ParagraphRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
}

/// Closed set of per-family extraction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAdapter {
    /// Titles come from `links[].target` (or `links[].page`).
    LinkedContext,
    /// Titles come from `paragraphs[].title`.
    ParagraphList,
}

impl RecordAdapter {
    /// Pulls the storage-form identifiers referenced by one record.
    ///
    /// Returns `None` when the record does not deserialize as this family's
    /// schema; identifiers that normalize to the empty string are dropped.
    pub fn extract_identifiers(&self, record: serde_json::Value) -> Option<Vec<String>> {
        let mut titles = Vec::new();
        match self {
            RecordAdapter::LinkedContext => {
                let record: LinkedRecord = serde_json::from_value(record).ok()?;
                for link in &record.links {
                    if let Some(raw) = link.referenced_title() {
                        titles.push(raw.to_string());
                    }
                }
            }
            RecordAdapter::ParagraphList => {
                let record: ParagraphRecord = serde_json::from_value(record).ok()?;
                for paragraph in &record.paragraphs {
                    if let Some(raw) = paragraph.title.as_deref() {
                        titles.push(raw.to_string());
                    }
                }
            }
        }
        Some(
            titles
                .into_iter()
                .map(|raw| normalize_storage(&raw))
                .filter(|id| !id.is_empty())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn linked_context_reads_target_then_page() {
        let record = json!({
            "title": "Alan Turing",
            "links": [
                {"text": "crypto", "target": "Cryptography"},
                {"text": "legacy", "page": "Enigma machine"},
                {"text": "dead", "target": "", "page": "  "},
            ]
        });
        let ids = RecordAdapter::LinkedContext
            .extract_identifiers(record)
            .unwrap();
        assert_eq!(ids, vec!["Cryptography", "Enigma_machine"]);
    }

    #[test]
    fn linked_context_ignores_the_host_title() {
        let record = json!({"title": "Alan Turing", "links": []});
        let ids = RecordAdapter::LinkedContext
            .extract_identifiers(record)
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn paragraph_list_reads_paragraph_titles() {
        let record = json!({
            "id": "2hop_001",
            "paragraphs": [
                {"title": "Cryptography", "paragraph_text": "..."},
                {"title": "", "paragraph_text": "orphan"},
            ]
        });
        let ids = RecordAdapter::ParagraphList
            .extract_identifiers(record)
            .unwrap();
        assert_eq!(ids, vec!["Cryptography"]);
    }

    #[test]
    fn paragraph_body_falls_back_across_fields() {
        let paragraph: Paragraph =
            serde_json::from_value(json!({"title": "T", "content": "only content"})).unwrap();
        assert_eq!(paragraph.body(), Some("only content"));
    }
}
