//! Persistence port for articles and the attributes extracted from them.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};

use crate::article::{Article, Attribute, Field, Snippet, VerificationScores};
use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub articles: u64,
    pub fields: u64,
    pub attributes: u64,
    pub attachments: u64,
    pub snippets: u64,
}

/// Storage used by the resolver.
///
/// Writes outside `begin`/`commit` apply immediately. Lookups must be exact:
/// when more than one row matches, implementations return an ambiguity error
/// rather than picking one.
#[async_trait::async_trait]
pub trait AttributeStore: Send + Sync {
    async fn begin(&self) -> Result<()>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;

    /// Inserts the article, or replaces its abstract if it already exists.
    async fn insert_article(&self, article: &Article) -> Result<()>;
    async fn get_article(&self, id: &str) -> Result<Article>;
    async fn list_article_ids(&self) -> Result<Vec<String>>;
    async fn set_scores(&self, id: &str, scores: VerificationScores) -> Result<()>;

    async fn find_field(&self, name: &str, value: &str) -> Result<Option<Field>>;
    /// Fails with `Error::DuplicateField` when the pair already exists.
    async fn insert_field(&self, name: &str, value: &str) -> Result<Field>;

    async fn find_attribute(&self, name: &str, field_ids: &[i64]) -> Result<Option<Attribute>>;
    /// Fails with `Error::DuplicateAttribute` when the field set is taken.
    async fn insert_attribute(&self, name: &str, category: &str, field_ids: &[i64]) -> Result<Attribute>;
    async fn get_attribute(&self, id: i64) -> Result<Attribute>;

    async fn article_attribute_ids(&self, article_id: &str) -> Result<Vec<i64>>;
    /// Returns false when the attribute was already attached.
    async fn attach_attribute(&self, article_id: &str, attribute_id: i64) -> Result<bool>;
    async fn detach_all(&self, article_id: &str) -> Result<u64>;

    async fn article_snippets(&self, article_id: &str) -> Result<Vec<Snippet>>;
    /// Returns false when an identical snippet already exists for the article.
    async fn insert_snippet(&self, article_id: &str, name: &str, text: &str) -> Result<bool>;

    /// Removes every attribute, field, snippet and attachment. Articles stay.
    async fn clear_all_attributes(&self) -> Result<()>;
    async fn counts(&self) -> Result<StoreCounts>;
}
