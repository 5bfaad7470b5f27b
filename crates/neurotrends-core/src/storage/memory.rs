use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tokio::sync::Mutex;

use super::{AttributeStore, StoreCounts};
use crate::article::{
    canonical_field_ids, field_key, Article, Attribute, Field, Snippet, VerificationScores,
};
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
struct State {
    articles: BTreeMap<String, Article>,
    fields: Vec<Field>,
    attributes: Vec<Attribute>,
    attachments: BTreeSet<(String, i64)>,
    snippets: Vec<Snippet>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_article(&self, id: &str) -> Result<()> {
        if self.articles.contains_key(id) {
            Ok(())
        } else {
            Err(Error::ArticleNotFound(id.to_string()))
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: State,
    snapshot: Option<State>,
}

/// Store that keeps everything in memory. `begin` snapshots the state and
/// `rollback` restores it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AttributeStore for MemoryStore {
    async fn begin(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.snapshot.is_some() {
            return Err(Error::TransactionOpen);
        }
        inner.snapshot = Some(inner.state.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.snapshot.take().ok_or(Error::NoTransaction)?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state = inner.snapshot.take().ok_or(Error::NoTransaction)?;
        Ok(())
    }

    async fn insert_article(&self, article: &Article) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state.articles.get_mut(&article.id) {
            Some(existing) => {
                existing.abstract_text.clone_from(&article.abstract_text);
                existing.updated_at = article.updated_at;
            }
            None => {
                inner
                    .state
                    .articles
                    .insert(article.id.clone(), article.clone());
            }
        }
        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Article> {
        let inner = self.inner.lock().await;
        inner
            .state
            .articles
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ArticleNotFound(id.to_string()))
    }

    async fn list_article_ids(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.articles.keys().cloned().collect())
    }

    async fn set_scores(&self, id: &str, scores: VerificationScores) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let article = inner
            .state
            .articles
            .get_mut(id)
            .ok_or_else(|| Error::ArticleNotFound(id.to_string()))?;
        article.scores = scores;
        article.updated_at = Utc::now();
        Ok(())
    }

    async fn find_field(&self, name: &str, value: &str) -> Result<Option<Field>> {
        let inner = self.inner.lock().await;
        let matches: Vec<&Field> = inner
            .state
            .fields
            .iter()
            .filter(|f| f.name == name && f.value == value)
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [field] => Ok(Some((*field).clone())),
            _ => Err(Error::AmbiguousField {
                name: name.to_string(),
                value: value.to_string(),
                count: matches.len(),
            }),
        }
    }

    async fn insert_field(&self, name: &str, value: &str) -> Result<Field> {
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        if state.fields.iter().any(|f| f.name == name && f.value == value) {
            return Err(Error::DuplicateField {
                name: name.to_string(),
                value: value.to_string(),
            });
        }

        let field = Field {
            id: state.next_id(),
            name: name.to_string(),
            value: value.to_string(),
        };
        state.fields.push(field.clone());
        Ok(field)
    }

    async fn find_attribute(&self, name: &str, field_ids: &[i64]) -> Result<Option<Attribute>> {
        let inner = self.inner.lock().await;
        let wanted = canonical_field_ids(field_ids);
        let matches: Vec<&Attribute> = inner
            .state
            .attributes
            .iter()
            .filter(|a| a.name == name && a.field_ids == wanted)
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [attribute] => Ok(Some((*attribute).clone())),
            _ => Err(Error::AmbiguousAttribute {
                name: name.to_string(),
                fields: wanted.len(),
                count: matches.len(),
            }),
        }
    }

    async fn insert_attribute(&self, name: &str, category: &str, field_ids: &[i64]) -> Result<Attribute> {
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        let field_ids = canonical_field_ids(field_ids);
        if state
            .attributes
            .iter()
            .any(|a| a.name == name && a.field_ids == field_ids)
        {
            return Err(Error::DuplicateAttribute {
                name: name.to_string(),
                field_key: field_key(&field_ids),
            });
        }

        let attribute = Attribute {
            id: state.next_id(),
            name: name.to_string(),
            category: category.to_string(),
            field_ids,
        };
        state.attributes.push(attribute.clone());
        Ok(attribute)
    }

    async fn get_attribute(&self, id: i64) -> Result<Attribute> {
        let inner = self.inner.lock().await;
        inner
            .state
            .attributes
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(Error::AttributeNotFound(id))
    }

    async fn article_attribute_ids(&self, article_id: &str) -> Result<Vec<i64>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .attachments
            .iter()
            .filter(|(article, _)| article == article_id)
            .map(|(_, attribute)| *attribute)
            .collect())
    }

    async fn attach_attribute(&self, article_id: &str, attribute_id: i64) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        inner.state.require_article(article_id)?;
        Ok(inner
            .state
            .attachments
            .insert((article_id.to_string(), attribute_id)))
    }

    async fn detach_all(&self, article_id: &str) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.state.attachments.len();
        inner
            .state
            .attachments
            .retain(|(article, _)| article != article_id);
        Ok((before - inner.state.attachments.len()) as u64)
    }

    async fn article_snippets(&self, article_id: &str) -> Result<Vec<Snippet>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .snippets
            .iter()
            .filter(|s| s.article_id == article_id)
            .cloned()
            .collect())
    }

    async fn insert_snippet(&self, article_id: &str, name: &str, text: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        state.require_article(article_id)?;
        if state
            .snippets
            .iter()
            .any(|s| s.article_id == article_id && s.name == name && s.text == text)
        {
            return Ok(false);
        }

        let snippet = Snippet {
            id: state.next_id(),
            article_id: article_id.to_string(),
            name: name.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        };
        state.snippets.push(snippet);
        Ok(true)
    }

    async fn clear_all_attributes(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        state.attachments.clear();
        state.snippets.clear();
        state.attributes.clear();
        state.fields.clear();
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let inner = self.inner.lock().await;
        let state = &inner.state;
        Ok(StoreCounts {
            articles: state.articles.len() as u64,
            fields: state.fields.len() as u64,
            attributes: state.attributes.len() as u64,
            attachments: state.attachments.len() as u64,
            snippets: state.snippets.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let store = MemoryStore::new();
        store.insert_article(&Article::new("1")).await.unwrap();

        store.begin().await.unwrap();
        let field = store.insert_field("software.name", "spm").await.unwrap();
        let attr = store
            .insert_attribute("software", "analysis", &[field.id])
            .await
            .unwrap();
        store.attach_attribute("1", attr.id).await.unwrap();
        store.rollback().await.unwrap();

        assert_eq!(
            store.counts().await.unwrap(),
            StoreCounts {
                articles: 1,
                ..StoreCounts::default()
            }
        );
        assert!(matches!(store.rollback().await, Err(Error::NoTransaction)));
    }

    #[tokio::test]
    async fn test_commit_keeps_changes() {
        let store = MemoryStore::new();
        store.begin().await.unwrap();
        store.insert_article(&Article::new("1")).await.unwrap();
        store.commit().await.unwrap();

        assert_eq!(store.list_article_ids().await.unwrap(), vec!["1"]);
        assert!(matches!(store.commit().await, Err(Error::NoTransaction)));
    }

    #[tokio::test]
    async fn test_attribute_lookup_ignores_field_order() {
        let store = MemoryStore::new();
        let a = store.insert_field("software.name", "spm").await.unwrap();
        let b = store.insert_field("software.ver", "8").await.unwrap();
        let attr = store
            .insert_attribute("software", "analysis", &[b.id, a.id])
            .await
            .unwrap();

        let found = store.find_attribute("software", &[a.id, b.id]).await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(attr.id));
        assert!(store.find_attribute("software", &[a.id]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snippets_require_article() {
        let store = MemoryStore::new();
        let err = store.insert_snippet("9", "software", "SPM").await.unwrap_err();
        assert!(matches!(err, Error::ArticleNotFound(_)));

        store.insert_article(&Article::new("9")).await.unwrap();
        assert!(store.insert_snippet("9", "software", "SPM").await.unwrap());
        assert!(!store.insert_snippet("9", "software", "SPM").await.unwrap());
        assert!(store.insert_snippet("9", "scanner", "SPM").await.unwrap());
    }
}
