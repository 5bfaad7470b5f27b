use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::rule::MatchValue;

pub const NAME_KEY: &str = "name";
pub const VERSION_KEY: &str = "ver";
pub const VALUE_KEY: &str = "value";

/// One extraction result before it is persisted.
///
/// `version` is `None` when the tag's rules do not resolve versions at all,
/// and `Some("")` when the tag was found but no version could be determined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, String>,
}

impl Tag {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            payload: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(name).with_version(version)
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Tag for a value-carrying match. A captured mapping is merged into the
    /// payload; its `name` entry never overrides the tag name and its `ver`
    /// entry becomes the version.
    pub fn from_value(name: &str, value: MatchValue) -> Self {
        let tag = Self::new(name);
        match value {
            MatchValue::Flag(_) => tag,
            MatchValue::Text(text) => tag.with_field(VALUE_KEY, text),
            MatchValue::Captures(groups) => match groups.into_iter().flatten().find(|g| !g.is_empty()) {
                Some(text) => tag.with_field(VALUE_KEY, text),
                None => tag,
            },
            MatchValue::Mapping(mut map) => {
                map.remove(NAME_KEY);
                let version = map.remove(VERSION_KEY);
                Self {
                    version,
                    payload: map,
                    ..tag
                }
            }
        }
    }

    pub fn is_versioned(&self) -> bool {
        self.version.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// (key, value) pairs identifying this tag, in a stable order.
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![(NAME_KEY.to_string(), self.name.clone())];
        if let Some(version) = &self.version {
            fields.push((VERSION_KEY.to_string(), version.clone()));
        }
        fields.extend(
            self.payload
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        fields
    }
}
