use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::article::{Attribute, Field, VerificationScores};
use crate::config::ExtractionConfig;
use crate::document::{DocumentLoad, DocumentLoader, DocumentType};
use crate::extract::{DocumentAggregator, DocumentVerifier, GroupResult, RuleBook, Tag};
use crate::storage::AttributeStore;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Verification is on and the article has no abstract to check against.
    NoAbstract,
    EmptyCorpus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
    Resolved,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
    pub fields_created: usize,
    pub attributes_created: usize,
    pub attributes_attached: usize,
    pub snippets_created: usize,
}

impl ResolveStats {
    pub const fn created_anything(&self) -> bool {
        self.fields_created
            + self.attributes_created
            + self.attributes_attached
            + self.snippets_created
            > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub article_id: String,
    pub status: ResolveStatus,
    pub scores: VerificationScores,
    pub documents: Vec<DocumentType>,
    pub groups: Vec<GroupResult>,
    /// Attributes matched in this run, whether newly attached or not.
    pub attribute_ids: Vec<i64>,
    pub stats: ResolveStats,
}

impl ResolveOutcome {
    fn new(article_id: &str) -> Self {
        Self {
            article_id: article_id.to_string(),
            status: ResolveStatus::Resolved,
            scores: VerificationScores::default(),
            documents: Vec::new(),
            groups: Vec::new(),
            attribute_ids: Vec::new(),
            stats: ResolveStats::default(),
        }
    }

    fn skipped(mut self, reason: SkipReason) -> Self {
        self.status = ResolveStatus::Skipped(reason);
        self
    }

    pub const fn is_resolved(&self) -> bool {
        matches!(self.status, ResolveStatus::Resolved)
    }
}

pub struct AttributeResolver {
    store: Arc<dyn AttributeStore>,
    loader: Arc<dyn DocumentLoader>,
    rules: Arc<RuleBook>,
    verifier: DocumentVerifier,
    config: ExtractionConfig,
}

impl AttributeResolver {
    #[must_use]
    pub fn new(
        store: Arc<dyn AttributeStore>,
        loader: Arc<dyn DocumentLoader>,
        rules: Arc<RuleBook>,
    ) -> Self {
        let config = ExtractionConfig::default();
        Self {
            store,
            loader,
            rules,
            verifier: DocumentVerifier::new(config.threshold),
            config,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.verifier = DocumentVerifier::new(config.threshold);
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn AttributeStore> {
        &self.store
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extracts the requested tag groups (all of them for `None`) from the
    /// article's documents and attaches the matching attributes.
    ///
    /// Running twice over unchanged input creates nothing the second time.
    pub async fn resolve(&self, article_id: &str, groups: Option<&[String]>) -> Result<ResolveOutcome> {
        let selected = self.rules.select(groups)?;
        let article = self.store.get_article(article_id).await?;
        let mut outcome = ResolveOutcome::new(article_id);

        let loaded = self.load_documents(article_id).await?;

        let corpus = if self.config.verify {
            let Some(abstract_text) = article.usable_abstract() else {
                self.store
                    .set_scores(article_id, VerificationScores::default())
                    .await?;
                tracing::info!(article_id, "No abstract to verify against, skipping");
                return Ok(outcome.skipped(SkipReason::NoAbstract));
            };

            let mut admitted = Vec::new();
            for (doc_type, text) in loaded {
                let score = self.verifier.score(abstract_text, Some(&text));
                outcome.scores.set(doc_type, score);
                if self.verifier.admits(score) {
                    admitted.push((doc_type, text));
                } else {
                    tracing::debug!(article_id, %doc_type, ?score, "Document failed verification");
                }
            }
            self.store.set_scores(article_id, outcome.scores).await?;
            admitted
        } else {
            loaded
        };

        let corpus: Vec<(DocumentType, String)> = corpus
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();
        if corpus.is_empty() {
            tracing::info!(article_id, "No usable documents, skipping");
            return Ok(outcome.skipped(SkipReason::EmptyCorpus));
        }

        outcome.documents = corpus.iter().map(|(doc_type, _)| *doc_type).collect();
        let texts: Vec<&str> = corpus.iter().map(|(_, text)| text.as_str()).collect();
        let results = DocumentAggregator::new(self.rules.normalizers()).aggregate(&texts, &selected);

        let mut attached: HashSet<i64> = self
            .store
            .article_attribute_ids(article_id)
            .await?
            .into_iter()
            .collect();
        let mut matched = HashSet::new();
        let mut stored_snippets = HashSet::new();

        for result in results.into_iter().filter(|r| !r.is_empty()) {
            for tag in &result.tags {
                let attribute = self.find_or_create(&result, tag, &mut outcome.stats).await?;
                if matched.insert(attribute.id) {
                    outcome.attribute_ids.push(attribute.id);
                }
                if attached.insert(attribute.id)
                    && self.store.attach_attribute(article_id, attribute.id).await?
                {
                    outcome.stats.attributes_attached += 1;
                }
            }

            if self.config.capture_snippets {
                for text in result.snippets.iter().filter(|s| !s.is_empty()) {
                    if stored_snippets.insert((result.name.clone(), text.clone()))
                        && self.store.insert_snippet(article_id, &result.name, text).await?
                    {
                        outcome.stats.snippets_created += 1;
                    }
                }
            }

            outcome.groups.push(result);
        }

        tracing::info!(
            article_id,
            documents = outcome.documents.len(),
            attributes = outcome.attribute_ids.len(),
            attached = outcome.stats.attributes_attached,
            "Resolved article"
        );

        Ok(outcome)
    }

    pub async fn clear_article(&self, article_id: &str) -> Result<u64> {
        self.store.get_article(article_id).await?;
        let removed = self.store.detach_all(article_id).await?;
        tracing::info!(article_id, removed, "Cleared article attributes");
        Ok(removed)
    }

    async fn load_documents(&self, article_id: &str) -> Result<Vec<(DocumentType, String)>> {
        let mut documents = Vec::new();
        for doc_type in DocumentType::ALL {
            match self.loader.load(article_id, doc_type).await? {
                DocumentLoad::Parsed(text) => documents.push((doc_type, text)),
                DocumentLoad::Missing => {
                    tracing::debug!(article_id, %doc_type, "Document not available");
                }
                DocumentLoad::Malformed(reason) => {
                    tracing::warn!(article_id, %doc_type, %reason, "Malformed document, treating as absent");
                }
            }
        }
        Ok(documents)
    }

    /// Fields are keyed `{group}.{key}`; the attribute is the one whose field
    /// set is exactly this tag's.
    async fn find_or_create(
        &self,
        group: &GroupResult,
        tag: &Tag,
        stats: &mut ResolveStats,
    ) -> Result<Attribute> {
        let mut field_ids = Vec::new();
        for (key, value) in tag.fields() {
            let name = format!("{}.{key}", group.name);
            let field = self.field_for(&name, &value, stats).await?;
            field_ids.push(field.id);
        }

        if let Some(attribute) = self.store.find_attribute(&group.name, &field_ids).await? {
            return Ok(attribute);
        }

        match self
            .store
            .insert_attribute(&group.name, &group.category, &field_ids)
            .await
        {
            Ok(attribute) => {
                stats.attributes_created += 1;
                tracing::debug!(group = %group.name, tag = %tag.name, id = attribute.id, "Created attribute");
                Ok(attribute)
            }
            // Another resolver inserted it between our find and insert.
            Err(err @ Error::DuplicateAttribute { .. }) => self
                .store
                .find_attribute(&group.name, &field_ids)
                .await?
                .ok_or(err),
            Err(err) => Err(err),
        }
    }

    async fn field_for(&self, name: &str, value: &str, stats: &mut ResolveStats) -> Result<Field> {
        if let Some(field) = self.store.find_field(name, value).await? {
            return Ok(field);
        }

        match self.store.insert_field(name, value).await {
            Ok(field) => {
                stats.fields_created += 1;
                Ok(field)
            }
            Err(err @ Error::DuplicateField { .. }) => {
                tracing::debug!(name, value, "Field created concurrently, reusing it");
                self.store.find_field(name, value).await?.ok_or(err)
            }
            Err(err) => Err(err),
        }
    }
}
