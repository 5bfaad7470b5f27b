pub mod article;
pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod resolver;
pub mod storage;

pub use article::{Article, Attribute, Field, Snippet, VerificationScores};
pub use batch::{BatchFailure, BatchReport, BatchRunner};
pub use config::{ConfigError, ExtractionConfig};
pub use document::{
    DirectoryDocumentLoader, DocumentLoad, DocumentLoader, DocumentType, MemoryDocumentLoader,
    ParseError,
};
pub use error::{Error, Result};
pub use extract::{
    DocumentAggregator, DocumentVerifier, GroupResult, NormalizerTable, PatternRule, RegexRule,
    RuleBook, RuleDefinition, Ruleset, Tag, TagExtractor, TagGroup, VersionedRuleSet,
};
pub use resolver::{AttributeResolver, ResolveOutcome, ResolveStats, ResolveStatus, SkipReason};
pub use storage::{AttributeStore, MemoryStore, SqliteStore, StoreCounts};
