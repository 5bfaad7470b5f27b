use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct Substitution {
    pub pattern: Regex,
    pub replacement: String,
}

impl Substitution {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }
}

static HYPHEN_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"- ").unwrap());
static DASH_VARIANTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x{2010}-\x{2015}\x{2212}]").unwrap());
static STRIP_DEFAULT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"\x{a2}\x{a9}\x{ae}\x{03}]"#).unwrap());
static STRIP_KEEP_QUOTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x{a2}\x{a9}\x{ae}\x{03}]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\x{a0}]+").unwrap());

#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    steps: Vec<Substitution>,
}

impl Ruleset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_step(mut self, step: Substitution) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, pattern: &str, replacement: &str) -> Result<(), regex::Error> {
        self.steps.push(Substitution::new(pattern, replacement)?);
        Ok(())
    }

    /// Hyphenation repair, dash folding, punctuation stripping, whitespace collapse.
    #[must_use]
    pub fn standard() -> Self {
        Self::build(&STRIP_DEFAULT)
    }

    /// Like [`Ruleset::standard`] but keeps quotes and apostrophes, for tags
    /// whose names contain them.
    #[must_use]
    pub fn preserving_quotes() -> Self {
        Self::build(&STRIP_KEEP_QUOTES)
    }

    fn build(strip: &Regex) -> Self {
        let steps = [
            (&*HYPHEN_BREAK, "-"),
            (&*DASH_VARIANTS, "-"),
            (strip, ""),
            (&*WHITESPACE, " "),
        ]
        .into_iter()
        .map(|(pattern, replacement)| Substitution {
            pattern: pattern.clone(),
            replacement: replacement.to_string(),
        })
        .collect();
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clean(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for step in &self.steps {
            cleaned = step
                .pattern
                .replace_all(&cleaned, step.replacement.as_str())
                .into_owned();
        }
        cleaned
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerTable {
    default: Ruleset,
    exceptions: HashMap<String, Ruleset>,
}

impl Default for NormalizerTable {
    fn default() -> Self {
        Self::new(Ruleset::standard())
    }
}

impl NormalizerTable {
    #[must_use]
    pub fn new(default: Ruleset) -> Self {
        Self {
            default,
            exceptions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_exception(mut self, tag: impl Into<String>, ruleset: Ruleset) -> Self {
        self.exceptions.insert(tag.into(), ruleset);
        self
    }

    pub fn add_exception(&mut self, tag: impl Into<String>, ruleset: Ruleset) {
        self.exceptions.insert(tag.into(), ruleset);
    }

    pub fn default_ruleset(&self) -> &Ruleset {
        &self.default
    }

    pub fn exception(&self, tag: &str) -> Option<&Ruleset> {
        self.exceptions.get(tag)
    }

    pub fn for_tag(&self, tag: &str) -> &Ruleset {
        self.exceptions.get(tag).unwrap_or(&self.default)
    }
}
