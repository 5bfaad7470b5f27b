use serde::{Deserialize, Serialize};

use crate::extract::DEFAULT_THRESHOLD;

pub const DEFAULT_COMMIT_EVERY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub threshold: f64,
    /// When false, every present document is admitted without scoring
    pub verify: bool,
    pub capture_snippets: bool,
    pub commit_every: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            verify: true,
            capture_snippets: false,
            commit_every: DEFAULT_COMMIT_EVERY,
        }
    }
}

impl ExtractionConfig {
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub const fn with_snippets(mut self, capture: bool) -> Self {
        self.capture_snippets = capture;
        self
    }

    #[must_use]
    pub const fn with_commit_every(mut self, n: usize) -> Self {
        self.commit_every = n;
        self
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold));
        }
        if self.commit_every == 0 {
            return Err(ConfigError::ZeroCommitInterval);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Verification threshold must be within 0..=1, got {0}")]
    ThresholdOutOfRange(f64),
    #[error("commit_every must be at least 1")]
    ZeroCommitInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExtractionConfig::default();
        assert!((config.threshold - 0.85).abs() < f64::EPSILON);
        assert!(config.verify);
        assert!(!config.capture_snippets);
        assert_eq!(config.commit_every, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ExtractionConfig::from_json(r#"{"capture_snippets": true}"#).unwrap();
        assert!(config.capture_snippets);
        assert_eq!(config.commit_every, DEFAULT_COMMIT_EVERY);
    }

    #[test]
    fn test_validation() {
        let err = ExtractionConfig::default().with_threshold(1.5).validate();
        assert!(matches!(err, Err(ConfigError::ThresholdOutOfRange(_))));

        let err = ExtractionConfig::from_json(r#"{"commit_every": 0}"#).unwrap_err();
        assert!(err.is_configuration());
    }
}
