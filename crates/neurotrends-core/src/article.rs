use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::DocumentType;

/// Abstract-overlap scores for each scraped document type. `None` means the
/// document was not available, not that it scored zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationScores {
    pub html: Option<f64>,
    pub pdf: Option<f64>,
}

impl VerificationScores {
    pub const fn get(&self, doc_type: DocumentType) -> Option<f64> {
        match doc_type {
            DocumentType::Html => self.html,
            DocumentType::Pdf => self.pdf,
        }
    }

    pub fn set(&mut self, doc_type: DocumentType, score: Option<f64>) {
        match doc_type {
            DocumentType::Html => self.html = score,
            DocumentType::Pdf => self.pdf = score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    pub scores: VerificationScores,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            abstract_text: None,
            scores: VerificationScores::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn usable_abstract(&self) -> Option<&str> {
        self.abstract_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub id: i64,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: i64,
    pub name: String,
    pub category: String,
    /// Sorted, de-duplicated.
    pub field_ids: Vec<i64>,
}

impl Attribute {
    pub fn field_key(&self) -> String {
        field_key(&self.field_ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: i64,
    pub article_id: String,
    pub name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

pub fn canonical_field_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Canonical text key for a field id set; equal sets produce equal keys.
pub fn field_key(ids: &[i64]) -> String {
    canonical_field_ids(ids)
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
