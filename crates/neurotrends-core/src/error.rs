use thiserror::Error;

use crate::config::ConfigError;
use crate::extract::RuleConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("Attribute not found: {0}")]
    AttributeNotFound(i64),

    #[error("Unrecognized document type: {0}")]
    UnknownDocumentType(String),

    #[error("Unknown tag group: {0}")]
    UnknownTagGroup(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Rule configuration error: {0}")]
    RuleConfig(#[from] RuleConfigError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ambiguous field lookup: {name}={value:?} matched {count} rows")]
    AmbiguousField {
        name: String,
        value: String,
        count: usize,
    },

    #[error("Ambiguous attribute lookup: '{name}' with {fields} fields matched {count} rows")]
    AmbiguousAttribute {
        name: String,
        fields: usize,
        count: usize,
    },

    #[error("Field already exists: {name}={value:?}")]
    DuplicateField { name: String, value: String },

    #[error("Attribute already exists: '{name}' with fields [{field_key}]")]
    DuplicateAttribute { name: String, field_key: String },

    #[error("No open transaction")]
    NoTransaction,

    #[error("Transaction already open")]
    TransactionOpen,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors caused by the rule source or caller input rather than the data.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownDocumentType(_)
                | Self::UnknownTagGroup(_)
                | Self::Pattern(_)
                | Self::RuleConfig(_)
                | Self::Config(_)
        )
    }

    pub const fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Self::AmbiguousField { .. } | Self::AmbiguousAttribute { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::UnknownDocumentType("docx".into()).is_configuration());
        assert!(Error::UnknownTagGroup("nope".into()).is_configuration());
        assert!(!Error::ArticleNotFound("1".into()).is_configuration());

        let ambiguous = Error::AmbiguousField {
            name: "software.ver".into(),
            value: "8".into(),
            count: 2,
        };
        assert!(ambiguous.is_ambiguous());
        assert!(!ambiguous.is_configuration());
    }
}
