use std::sync::Arc;

use crate::resolver::{AttributeResolver, ResolveStatus, SkipReason};
use crate::{Error, Result};

#[derive(Debug)]
pub struct BatchFailure {
    pub article_id: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub resolved: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failed: Vec<BatchFailure>,
    /// Articles that resolved but were undone when a later article in the
    /// same batch failed.
    pub rolled_back: Vec<String>,
    pub commits: usize,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.resolved.len() + self.skipped.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.rolled_back.is_empty()
    }

    fn record(&mut self, article_id: String, status: ResolveStatus) {
        match status {
            ResolveStatus::Resolved => self.resolved.push(article_id),
            ResolveStatus::Skipped(reason) => self.skipped.push((article_id, reason)),
        }
    }
}

/// Resolves many articles, committing every `commit_every` of them.
pub struct BatchRunner {
    resolver: Arc<AttributeResolver>,
    commit_every: usize,
}

impl BatchRunner {
    #[must_use]
    pub fn new(resolver: Arc<AttributeResolver>) -> Self {
        let commit_every = resolver.config().commit_every.max(1);
        Self {
            resolver,
            commit_every,
        }
    }

    #[must_use]
    pub fn with_commit_every(mut self, n: usize) -> Self {
        self.commit_every = n.max(1);
        self
    }

    pub fn resolver(&self) -> &AttributeResolver {
        &self.resolver
    }

    pub async fn run_all(&self, groups: Option<&[String]>) -> Result<BatchReport> {
        let ids = self.resolver.store().list_article_ids().await?;
        self.run(&ids, groups).await
    }

    /// A failing article rolls back its open batch and processing moves on.
    /// Only an unknown group name aborts the run, before anything is written.
    pub async fn run(&self, article_ids: &[String], groups: Option<&[String]>) -> Result<BatchReport> {
        self.resolver.rules().select(groups)?;

        let store = self.resolver.store();
        let mut report = BatchReport::default();
        let mut pending: Vec<(String, ResolveStatus)> = Vec::new();

        store.begin().await?;
        for article_id in article_ids {
            match self.resolver.resolve(article_id, groups).await {
                Ok(outcome) => {
                    pending.push((outcome.article_id, outcome.status));
                    if pending.len() >= self.commit_every {
                        store.commit().await?;
                        report.commits += 1;
                        for (id, status) in pending.drain(..) {
                            report.record(id, status);
                        }
                        store.begin().await?;
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        article_id = %article_id,
                        error = %error,
                        undone = pending.len(),
                        "Article failed, rolling back batch"
                    );
                    store.rollback().await?;
                    report
                        .rolled_back
                        .extend(pending.drain(..).map(|(id, _)| id));
                    report.failed.push(BatchFailure {
                        article_id: article_id.clone(),
                        error,
                    });
                    store.begin().await?;
                }
            }
        }

        store.commit().await?;
        if !pending.is_empty() {
            report.commits += 1;
            for (id, status) in pending {
                report.record(id, status);
            }
        }

        tracing::info!(
            resolved = report.resolved.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            rolled_back = report.rolled_back.len(),
            commits = report.commits,
            "Batch finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Article;
    use crate::config::ExtractionConfig;
    use crate::document::{DocumentLoad, DocumentLoader, DocumentType};
    use crate::extract::{PatternRule, RegexRule, RuleBook, RuleDefinition, TagGroup};
    use crate::storage::{AttributeStore, MemoryStore};

    /// Serves the same text for every article except `failing`.
    struct FlakyLoader {
        failing: &'static str,
    }

    #[async_trait::async_trait]
    impl DocumentLoader for FlakyLoader {
        async fn load(&self, article_id: &str, doc_type: DocumentType) -> Result<DocumentLoad> {
            if article_id == self.failing {
                return Err(std::io::Error::other("disk gone").into());
            }
            Ok(match doc_type {
                DocumentType::Html => DocumentLoad::Parsed("Processed with FSL".into()),
                DocumentType::Pdf => DocumentLoad::Missing,
            })
        }
    }

    async fn runner(ids: &[&str], commit_every: usize) -> BatchRunner {
        let store = MemoryStore::new();
        for id in ids {
            store.insert_article(&Article::new(*id)).await.unwrap();
        }
        let fsl: Arc<dyn PatternRule> = Arc::new(RegexRule::flag(r"\bFSL\b").unwrap());
        let group = TagGroup::new("software", "analysis")
            .with_tag("fsl", RuleDefinition::plain(vec![fsl]))
            .unwrap();
        let rules = RuleBook::new().with_group(group).unwrap();
        let resolver = AttributeResolver::new(
            Arc::new(store),
            Arc::new(FlakyLoader { failing: "3" }),
            Arc::new(rules),
        )
        .with_config(
            ExtractionConfig::default()
                .with_verify(false)
                .with_commit_every(commit_every),
        );
        BatchRunner::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn test_commits_every_n() {
        let runner = runner(&["1", "2", "4", "5", "6"], 2).await;

        let report = runner.run_all(None).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.processed(), 5);
        assert_eq!(report.commits, 3);
        assert_eq!(report.resolved, vec!["1", "2", "4", "5", "6"]);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_open_batch() {
        let runner = runner(&["1", "2", "3", "4", "5"], 3).await;

        let report = runner.run_all(None).await.unwrap();
        assert_eq!(report.rolled_back, vec!["1", "2"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].article_id, "3");
        assert_eq!(report.resolved, vec!["4", "5"]);
        assert_eq!(report.commits, 1);

        let store = runner.resolver().store();
        assert!(store.article_attribute_ids("1").await.unwrap().is_empty());
        assert_eq!(store.article_attribute_ids("4").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_group_aborts_before_writing() {
        let runner = runner(&["1"], 10).await;

        let err = runner
            .run_all(Some(&["scanner".to_string()][..]))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(runner.resolver().store().counts().await.unwrap().fields, 0);
    }
}
