use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::normalize::{NormalizerTable, Ruleset};
use super::rule::{
    CaptureMode, PatternRule, RegexRule, RuleDefinition, Rules, VersionNormalizer,
    VersionedRuleSet, DEFAULT_CONTEXT,
};
use crate::{Error, Result};

#[derive(Debug, Error)]
pub enum RuleConfigError {
    #[error("Tag '{0}' has no presence rules")]
    MissingPresence(String),
    #[error("Tag '{0}' mixes plain rules with a versioned rule set")]
    ConflictingShapes(String),
    #[error("Tag '{tag}' uses reserved or empty version label '{label}'")]
    ReservedLabel { tag: String, label: String },
    #[error("Tag '{tag}' defines version '{label}' more than once")]
    DuplicateLabel { tag: String, label: String },
    #[error("Tag group '{0}' defined more than once")]
    DuplicateGroup(String),
    #[error("Tag '{tag}' defined more than once in group '{group}'")]
    DuplicateTag { group: String, tag: String },
}

#[derive(Debug, Clone)]
pub struct TagGroup {
    name: String,
    category: String,
    tags: Vec<(String, RuleDefinition)>,
}

impl TagGroup {
    #[must_use]
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>, definition: RuleDefinition) -> Result<Self> {
        self.add_tag(tag, definition)?;
        Ok(self)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>, definition: RuleDefinition) -> Result<()> {
        let tag = tag.into();
        definition.validate(&tag)?;
        if self.tags.iter().any(|(existing, _)| *existing == tag) {
            return Err(RuleConfigError::DuplicateTag {
                group: self.name.clone(),
                tag,
            }
            .into());
        }
        self.tags.push((tag, definition));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn tags(&self) -> &[(String, RuleDefinition)] {
        &self.tags
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    groups: Vec<TagGroup>,
    normalizers: NormalizerTable,
}

impl RuleBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: TagGroup) -> Result<Self> {
        self.add_group(group)?;
        Ok(self)
    }

    pub fn add_group(&mut self, group: TagGroup) -> Result<()> {
        if self.group(group.name()).is_some() {
            return Err(RuleConfigError::DuplicateGroup(group.name).into());
        }
        self.groups.push(group);
        Ok(())
    }

    #[must_use]
    pub fn with_normalizers(mut self, normalizers: NormalizerTable) -> Self {
        self.normalizers = normalizers;
        self
    }

    pub const fn normalizers(&self) -> &NormalizerTable {
        &self.normalizers
    }

    pub fn groups(&self) -> &[TagGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&TagGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Groups named by `filter`, in filter order, or every group when there
    /// is no filter.
    pub fn select(&self, filter: Option<&[String]>) -> Result<Vec<&TagGroup>> {
        match filter {
            None => Ok(self.groups.iter().collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    self.group(name)
                        .ok_or_else(|| Error::UnknownTagGroup(name.clone()))
                })
                .collect(),
        }
    }

    pub fn from_config(config: &RuleBookConfig) -> Result<Self> {
        let mut book = Self::new();
        for group_config in &config.groups {
            let mut group = TagGroup::new(&group_config.name, &group_config.category);
            for tag_config in &group_config.tags {
                group.add_tag(&tag_config.name, tag_config.compile()?)?;
                if tag_config.preserve_quotes {
                    book.normalizers
                        .add_exception(&tag_config.name, Ruleset::preserving_quotes());
                }
            }
            book.add_group(group)?;
        }
        Ok(book)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: RuleBookConfig = serde_json::from_str(json)?;
        Self::from_config(&config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleBookConfig {
    pub groups: Vec<TagGroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagGroupConfig {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<TagConfig>,
}

/// One tag, either as a plain `rules` list or as a versioned set with
/// `bool`, `versions` and `arbit` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub preserve_quotes: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleConfig>,
    #[serde(default, rename = "bool", skip_serializing_if = "Vec::is_empty")]
    pub presence: Vec<RuleConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<KnownVersionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arbit: Option<ArbitraryConfig>,
}

impl TagConfig {
    fn is_versioned(&self) -> bool {
        !self.presence.is_empty() || !self.versions.is_empty() || self.arbit.is_some()
    }

    pub fn compile(&self) -> Result<RuleDefinition> {
        if !self.rules.is_empty() && self.is_versioned() {
            return Err(RuleConfigError::ConflictingShapes(self.name.clone()).into());
        }

        if !self.is_versioned() {
            return Ok(RuleDefinition::Plain(compile_rules(&self.rules)?));
        }

        let mut set = VersionedRuleSet::new(compile_rules(&self.presence)?);
        for known in &self.versions {
            set = set.with_known(&known.label, compile_rules(&known.rules)?);
        }
        if let Some(arbit) = &self.arbit {
            let (rules, normalizer) = arbit.compile()?;
            set = set.with_arbitrary(rules, normalizer);
        }
        Ok(RuleDefinition::Versioned(set))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownVersionConfig {
    pub label: String,
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArbitraryConfig {
    Rules(Vec<RuleConfig>),
    Detailed {
        src: Vec<RuleConfig>,
        #[serde(default)]
        fun: NormalizerConfig,
    },
}

impl ArbitraryConfig {
    fn compile(&self) -> Result<(Rules, VersionNormalizer)> {
        match self {
            Self::Rules(rules) => Ok((compile_rules(rules)?, VersionNormalizer::Identity)),
            Self::Detailed { src, fun } => Ok((compile_rules(src)?, fun.compile()?)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizerConfig {
    #[default]
    Identity,
    Lowercase,
    Uppercase,
    Replace { pattern: String, replacement: String },
}

impl NormalizerConfig {
    fn compile(&self) -> Result<VersionNormalizer> {
        Ok(match self {
            Self::Identity => VersionNormalizer::Identity,
            Self::Lowercase => VersionNormalizer::Lowercase,
            Self::Uppercase => VersionNormalizer::Uppercase,
            Self::Replace {
                pattern,
                replacement,
            } => VersionNormalizer::replace(pattern, replacement)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleConfig {
    Pattern(String),
    Detailed {
        pattern: String,
        #[serde(default)]
        capture: CaptureMode,
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<usize>,
    },
}

impl RuleConfig {
    pub fn compile(&self) -> Result<RegexRule> {
        let rule = match self {
            Self::Pattern(pattern) => RegexRule::flag(pattern)?,
            Self::Detailed {
                pattern,
                capture,
                case_insensitive,
                context,
            } => {
                let rule = if *case_insensitive {
                    RegexRule::case_insensitive(pattern, *capture)?
                } else {
                    RegexRule::new(pattern, *capture)?
                };
                rule.with_context(context.unwrap_or(DEFAULT_CONTEXT))
            }
        };
        Ok(rule)
    }
}

fn compile_rules(configs: &[RuleConfig]) -> Result<Rules> {
    configs
        .iter()
        .map(|config| Ok(Arc::new(config.compile()?) as Arc<dyn PatternRule>))
        .collect()
}
