use serde::{Deserialize, Serialize};

use super::book::TagGroup;
use super::normalize::NormalizerTable;
use super::rule::RuleDefinition;
use super::tag::Tag;

/// Document text with the default cleanup already applied, so groups and
/// tags without an exception ruleset share one pass.
#[derive(Debug, Clone)]
pub struct PreparedText<'a> {
    raw: &'a str,
    cleaned: String,
}

impl<'a> PreparedText<'a> {
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn cleaned(&self) -> &str {
        &self.cleaned
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub tags: Vec<Tag>,
    pub snippets: Vec<String>,
}

impl Extraction {
    pub fn merge(&mut self, other: Self) {
        self.tags.extend(other.tags);
        self.snippets.extend(other.snippets);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TagExtractor<'a> {
    normalizers: &'a NormalizerTable,
}

impl<'a> TagExtractor<'a> {
    #[must_use]
    pub const fn new(normalizers: &'a NormalizerTable) -> Self {
        Self { normalizers }
    }

    pub fn prepare<'t>(&self, raw: &'t str) -> PreparedText<'t> {
        PreparedText {
            raw,
            cleaned: self.normalizers.default_ruleset().clean(raw),
        }
    }

    pub fn extract_text(&self, text: &str, group: &TagGroup) -> Extraction {
        self.extract(&self.prepare(text), group)
    }

    pub fn extract(&self, text: &PreparedText<'_>, group: &TagGroup) -> Extraction {
        let mut output = Extraction::default();

        for (tag, definition) in group.tags() {
            match self.normalizers.exception(tag) {
                Some(ruleset) => {
                    let cleaned = ruleset.clean(text.raw());
                    extract_tag(tag, definition, &cleaned, &mut output);
                }
                None => extract_tag(tag, definition, text.cleaned(), &mut output),
            }
        }

        output
    }
}

fn extract_tag(tag: &str, definition: &RuleDefinition, text: &str, output: &mut Extraction) {
    let mut values = Vec::new();
    for rule in definition.presence() {
        for m in rule.apply(text) {
            if m.value.is_truthy() {
                output.snippets.push(m.snippet);
                values.push(m.value);
            }
        }
    }

    if values.is_empty() {
        return;
    }

    tracing::debug!(tag, matches = values.len(), "Tag found");

    if values.iter().any(|v| !v.is_flag()) {
        output
            .tags
            .extend(values.into_iter().map(|v| Tag::from_value(tag, v)));
        return;
    }

    let RuleDefinition::Versioned(set) = definition else {
        output.tags.push(Tag::new(tag));
        return;
    };

    let known = set.known_matches(text);
    if !known.is_empty() {
        output
            .tags
            .extend(known.into_iter().map(|label| Tag::versioned(tag, label)));
        return;
    }

    let arbitrary = set.arbitrary.as_ref().and_then(|a| a.resolve(text));
    output
        .tags
        .push(Tag::versioned(tag, arbitrary.unwrap_or_default()));
}
