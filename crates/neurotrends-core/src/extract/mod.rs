mod aggregate;
mod book;
mod normalize;
mod rule;
mod tag;
mod tagger;
mod verify;

pub use aggregate::{apply_version_precedence, dedup_tags, DocumentAggregator, GroupResult};
pub use book::{
    ArbitraryConfig, KnownVersionConfig, NormalizerConfig, RuleBook, RuleBookConfig, RuleConfig,
    RuleConfigError, TagConfig, TagGroup, TagGroupConfig,
};
pub use normalize::{NormalizerTable, Ruleset, Substitution};
pub use rule::{
    ArbitraryVersion, CaptureMode, FnRule, MatchValue, PatternRule, RegexRule, RuleDefinition,
    RuleMatch, Rules, VersionNormalizer, VersionedRuleSet, DEFAULT_CONTEXT,
};
pub use tag::{Tag, NAME_KEY, VALUE_KEY, VERSION_KEY};
pub use tagger::{Extraction, PreparedText, TagExtractor};
pub use verify::{DocumentVerifier, DEFAULT_THRESHOLD};
