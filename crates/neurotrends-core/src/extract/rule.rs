use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::RuleConfigError;

pub const DEFAULT_CONTEXT: usize = 50;

const PRESENCE_KEY: &str = "bool";
const ARBITRARY_KEY: &str = "arbit";

/// Value produced by one rule match. Its truthiness decides whether the
/// match counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchValue {
    Flag(bool),
    Text(String),
    Captures(Vec<Option<String>>),
    Mapping(BTreeMap<String, String>),
}

impl MatchValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Text(text) => !text.is_empty(),
            Self::Captures(groups) => groups.iter().flatten().any(|g| !g.is_empty()),
            Self::Mapping(map) => !map.is_empty(),
        }
    }

    pub const fn is_flag(&self) -> bool {
        matches!(self, Self::Flag(_))
    }

    pub fn first_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) if !text.is_empty() => Some(text),
            Self::Captures(groups) => groups
                .iter()
                .flatten()
                .map(String::as_str)
                .find(|g| !g.is_empty()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub value: MatchValue,
    pub snippet: String,
}

impl RuleMatch {
    #[must_use]
    pub fn new(value: MatchValue, snippet: impl Into<String>) -> Self {
        Self {
            value,
            snippet: snippet.into(),
        }
    }
}

pub trait PatternRule: Send + Sync + fmt::Debug {
    fn apply(&self, text: &str) -> Vec<RuleMatch>;

    fn matches(&self, text: &str) -> bool {
        self.apply(text).iter().any(|m| m.value.is_truthy())
    }
}

pub type Rules = Vec<Arc<dyn PatternRule>>;

fn any_match(rules: &[Arc<dyn PatternRule>], text: &str) -> bool {
    rules.iter().any(|rule| rule.matches(text))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Report presence only.
    #[default]
    Flag,
    /// Report the capture groups, or the whole match when there are none.
    Value,
    /// Report named capture groups as a field mapping.
    Named,
}

#[derive(Debug, Clone)]
pub struct RegexRule {
    regex: Regex,
    mode: CaptureMode,
    context: usize,
}

impl RegexRule {
    pub fn new(pattern: &str, mode: CaptureMode) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            mode,
            context: DEFAULT_CONTEXT,
        })
    }

    pub fn flag(pattern: &str) -> Result<Self, regex::Error> {
        Self::new(pattern, CaptureMode::Flag)
    }

    pub fn value(pattern: &str) -> Result<Self, regex::Error> {
        Self::new(pattern, CaptureMode::Value)
    }

    pub fn named(pattern: &str) -> Result<Self, regex::Error> {
        Self::new(pattern, CaptureMode::Named)
    }

    pub fn case_insensitive(pattern: &str, mode: CaptureMode) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: RegexBuilder::new(pattern).case_insensitive(true).build()?,
            mode,
            context: DEFAULT_CONTEXT,
        })
    }

    #[must_use]
    pub const fn with_context(mut self, context: usize) -> Self {
        self.context = context;
        self
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    fn value_of(&self, caps: &regex::Captures<'_>, whole: &str) -> MatchValue {
        match self.mode {
            CaptureMode::Flag => MatchValue::Flag(true),
            CaptureMode::Value => {
                let groups: Vec<Option<String>> = caps
                    .iter()
                    .skip(1)
                    .map(|g| g.map(|m| m.as_str().to_string()))
                    .collect();
                match groups.len() {
                    0 => MatchValue::Text(whole.to_string()),
                    1 => MatchValue::Text(groups.into_iter().flatten().next().unwrap_or_default()),
                    _ => MatchValue::Captures(groups),
                }
            }
            CaptureMode::Named => MatchValue::Mapping(
                self.regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.to_string(), m.as_str().to_string()))
                    })
                    .collect(),
            ),
        }
    }
}

impl PatternRule for RegexRule {
    fn apply(&self, text: &str) -> Vec<RuleMatch> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let snippet = context_window(text, whole.start(), whole.end(), self.context);
                Some(RuleMatch::new(self.value_of(&caps, whole.as_str()), snippet))
            })
            .collect()
    }
}

fn context_window(text: &str, start: usize, end: usize, radius: usize) -> String {
    let lo = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(start, |(i, _)| i);
    let hi = text[end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| end + i);
    text[lo..hi].to_string()
}

type MatchFn = dyn Fn(&str) -> Vec<RuleMatch> + Send + Sync;

#[derive(Clone)]
pub struct FnRule {
    name: String,
    func: Arc<MatchFn>,
}

impl FnRule {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Vec<RuleMatch> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule").field("name", &self.name).finish()
    }
}

impl PatternRule for FnRule {
    fn apply(&self, text: &str) -> Vec<RuleMatch> {
        (self.func)(text)
    }
}

type NormalizeFn = dyn Fn(&str) -> String + Send + Sync;

#[derive(Clone, Default)]
pub enum VersionNormalizer {
    #[default]
    Identity,
    Lowercase,
    Uppercase,
    Replace { pattern: Regex, replacement: String },
    Custom(Arc<NormalizeFn>),
}

impl VersionNormalizer {
    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(func))
    }

    pub fn replace(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self::Replace {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    pub fn apply(&self, raw: &str) -> String {
        match self {
            Self::Identity => raw.to_string(),
            Self::Lowercase => raw.to_lowercase(),
            Self::Uppercase => raw.to_uppercase(),
            Self::Replace {
                pattern,
                replacement,
            } => pattern.replace_all(raw, replacement.as_str()).into_owned(),
            Self::Custom(func) => func(raw),
        }
    }
}

impl fmt::Debug for VersionNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::Lowercase => f.write_str("Lowercase"),
            Self::Uppercase => f.write_str("Uppercase"),
            Self::Replace {
                pattern,
                replacement,
            } => f
                .debug_struct("Replace")
                .field("pattern", &pattern.as_str())
                .field("replacement", replacement)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArbitraryVersion {
    pub rules: Rules,
    pub normalizer: VersionNormalizer,
}

impl ArbitraryVersion {
    /// First non-empty capture across the rules, in order, normalized.
    pub fn resolve(&self, text: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            rule.apply(text)
                .iter()
                .find_map(|m| m.value.first_text().map(|raw| self.normalizer.apply(raw)))
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionedRuleSet {
    pub presence: Rules,
    pub known: Vec<(String, Rules)>,
    pub arbitrary: Option<ArbitraryVersion>,
}

impl VersionedRuleSet {
    #[must_use]
    pub fn new(presence: Rules) -> Self {
        Self {
            presence,
            known: Vec::new(),
            arbitrary: None,
        }
    }

    #[must_use]
    pub fn with_known(mut self, label: impl Into<String>, rules: Rules) -> Self {
        self.known.push((label.into(), rules));
        self
    }

    #[must_use]
    pub fn with_arbitrary(mut self, rules: Rules, normalizer: VersionNormalizer) -> Self {
        self.arbitrary = Some(ArbitraryVersion { rules, normalizer });
        self
    }

    pub fn known_matches<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.known
            .iter()
            .filter(|(_, rules)| any_match(rules, text))
            .map(|(label, _)| label.as_str())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum RuleDefinition {
    Plain(Rules),
    Versioned(VersionedRuleSet),
}

impl RuleDefinition {
    pub fn plain(rules: Rules) -> Self {
        Self::Plain(rules)
    }

    pub fn callable<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Vec<RuleMatch> + Send + Sync + 'static,
    {
        Self::Plain(vec![Arc::new(FnRule::new(name, func))])
    }

    pub fn presence(&self) -> &[Arc<dyn PatternRule>] {
        match self {
            Self::Plain(rules) => rules,
            Self::Versioned(set) => &set.presence,
        }
    }

    pub const fn is_versioned(&self) -> bool {
        matches!(self, Self::Versioned(_))
    }

    pub fn validate(&self, tag: &str) -> Result<(), RuleConfigError> {
        if self.presence().is_empty() {
            return Err(RuleConfigError::MissingPresence(tag.to_string()));
        }

        let Self::Versioned(set) = self else {
            return Ok(());
        };

        let mut seen = std::collections::HashSet::new();
        for (label, _) in &set.known {
            if label.is_empty() || label == PRESENCE_KEY || label == ARBITRARY_KEY {
                return Err(RuleConfigError::ReservedLabel {
                    tag: tag.to_string(),
                    label: label.clone(),
                });
            }
            if !seen.insert(label.as_str()) {
                return Err(RuleConfigError::DuplicateLabel {
                    tag: tag.to_string(),
                    label: label.clone(),
                });
            }
        }

        Ok(())
    }
}
