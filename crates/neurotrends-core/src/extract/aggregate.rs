use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::book::TagGroup;
use super::normalize::NormalizerTable;
use super::tag::Tag;
use super::tagger::{Extraction, TagExtractor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResult {
    pub name: String,
    pub category: String,
    pub tags: Vec<Tag>,
    pub snippets: Vec<String>,
}

impl GroupResult {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentAggregator<'a> {
    extractor: TagExtractor<'a>,
}

impl<'a> DocumentAggregator<'a> {
    #[must_use]
    pub const fn new(normalizers: &'a NormalizerTable) -> Self {
        Self {
            extractor: TagExtractor::new(normalizers),
        }
    }

    pub fn aggregate<S: AsRef<str>>(&self, documents: &[S], groups: &[&TagGroup]) -> Vec<GroupResult> {
        let prepared: Vec<_> = documents
            .iter()
            .map(|doc| self.extractor.prepare(doc.as_ref()))
            .collect();

        groups
            .iter()
            .map(|group| {
                let mut merged = Extraction::default();
                for doc in &prepared {
                    merged.merge(self.extractor.extract(doc, group));
                }

                let tags = apply_version_precedence(dedup_tags(merged.tags));
                tracing::debug!(group = group.name(), tags = tags.len(), "Aggregated tag group");

                GroupResult {
                    name: group.name().to_string(),
                    category: group.category().to_string(),
                    tags,
                    snippets: merged.snippets,
                }
            })
            .collect()
    }
}

pub fn dedup_tags(tags: Vec<Tag>) -> Vec<Tag> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Drops unversioned tags whose name also appears with a resolved version.
pub fn apply_version_precedence(tags: Vec<Tag>) -> Vec<Tag> {
    let versioned: HashSet<String> = tags
        .iter()
        .filter(|tag| tag.is_versioned())
        .map(|tag| tag.name.clone())
        .collect();

    tags.into_iter()
        .filter(|tag| tag.is_versioned() || !versioned.contains(&tag.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::extract::rule::{PatternRule, RegexRule, RuleDefinition, VersionedRuleSet};

    fn flag(pattern: &str) -> Arc<dyn PatternRule> {
        Arc::new(RegexRule::flag(pattern).unwrap())
    }

    fn groups() -> Vec<TagGroup> {
        let spm = VersionedRuleSet::new(vec![flag(r"\bSPM")]).with_known("8", vec![flag("SPM8")]);
        let software = TagGroup::new("software", "analysis")
            .with_tag("spm", RuleDefinition::Versioned(spm))
            .unwrap()
            .with_tag("fsl", RuleDefinition::plain(vec![flag(r"\bFSL\b")]))
            .unwrap();
        let scanner = TagGroup::new("scanner", "hardware")
            .with_tag("siemens", RuleDefinition::plain(vec![flag("Siemens")]))
            .unwrap();
        vec![software, scanner]
    }

    #[test]
    fn test_versioned_tag_wins_across_documents() {
        let tags = vec![Tag::versioned("toolX", "2.0"), Tag::new("toolX")];
        assert_eq!(apply_version_precedence(tags), vec![Tag::versioned("toolX", "2.0")]);

        let tags = vec![Tag::new("toolX"), Tag::versioned("toolX", "")];
        assert_eq!(apply_version_precedence(tags.clone()), tags);
    }

    #[test]
    fn test_dedup_preserves_first_seen_order() {
        let tags = vec![
            Tag::new("b"),
            Tag::versioned("a", "1"),
            Tag::new("b"),
            Tag::versioned("a", "1"),
            Tag::versioned("a", "2"),
        ];
        assert_eq!(
            dedup_tags(tags),
            vec![Tag::new("b"), Tag::versioned("a", "1"), Tag::versioned("a", "2")]
        );
    }

    #[test]
    fn test_aggregate_documents() {
        let groups = groups();
        let refs: Vec<&TagGroup> = groups.iter().collect();
        let table = NormalizerTable::default();
        let aggregator = DocumentAggregator::new(&table);

        let docs = ["Images were analysed with SPM8 and FSL.", "SPM was used. FSL too."];
        let results = aggregator.aggregate(&docs, &refs);

        assert_eq!(results.len(), 2);
        let software = &results[0];
        assert_eq!(software.category, "analysis");
        assert_eq!(
            software.tags,
            vec![Tag::versioned("spm", "8"), Tag::new("fsl")]
        );
        assert_eq!(software.snippets.len(), 4);

        assert!(results[1].is_empty());
    }

    #[test]
    fn test_aggregate_without_documents() {
        let groups = groups();
        let refs: Vec<&TagGroup> = groups.iter().collect();
        let table = NormalizerTable::default();

        let results = DocumentAggregator::new(&table).aggregate::<&str>(&[], &refs);
        assert!(results.iter().all(GroupResult::is_empty));
    }
}
