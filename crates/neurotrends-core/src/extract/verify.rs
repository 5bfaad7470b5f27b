use std::collections::HashSet;

pub const DEFAULT_THRESHOLD: f64 = 0.85;

const TRAILING_PUNCTUATION: [char; 4] = ['.', ',', ';', ':'];

/// Scores how much of an article's abstract appears in a candidate document.
#[derive(Debug, Clone, Copy)]
pub struct DocumentVerifier {
    threshold: f64,
}

impl Default for DocumentVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl DocumentVerifier {
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn abstract_words(abstract_text: &str) -> Vec<String> {
        abstract_text
            .split_whitespace()
            .map(|word| {
                word.to_lowercase()
                    .trim_end_matches(&TRAILING_PUNCTUATION[..])
                    .to_string()
            })
            .collect()
    }

    /// Returns `None` when no document was supplied, or when the abstract
    /// has no words to compare against.
    pub fn score(&self, abstract_text: &str, document: Option<&str>) -> Option<f64> {
        let document = document?;
        let words = Self::abstract_words(abstract_text);
        if words.is_empty() {
            return None;
        }

        let haystack = document.to_lowercase();
        let found: HashSet<&str> = words
            .iter()
            .map(String::as_str)
            .filter(|word| haystack.contains(word))
            .collect();

        Some(found.len() as f64 / words.len() as f64)
    }

    pub fn admits(&self, score: Option<f64>) -> bool {
        score.is_some_and(|s| s >= self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_overlap() {
        let verifier = DocumentVerifier::default();
        let score = verifier.score("the quick fox", Some("the quick fox jumps"));
        assert_eq!(score, Some(1.0));
        assert!(verifier.admits(score));
    }

    #[test]
    fn test_partial_overlap_is_excluded() {
        let verifier = DocumentVerifier::default();
        let score = verifier.score("the quick fox", Some("the")).unwrap();
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
        assert!(!verifier.admits(Some(score)));
    }

    #[test]
    fn test_absent_document_has_no_score() {
        let verifier = DocumentVerifier::default();
        assert_eq!(verifier.score("the quick fox", None), None);
        assert!(!verifier.admits(None));
    }

    #[test]
    fn test_case_and_punctuation() {
        let verifier = DocumentVerifier::default();
        let score = verifier.score("We used SPM8.", Some("... we USED spm8 for analysis"));
        assert_eq!(score, Some(1.0));
    }

    #[test]
    fn test_repeated_words_count_in_denominator() {
        let verifier = DocumentVerifier::default();
        let score = verifier.score("fox fox", Some("fox")).unwrap();
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_abstract() {
        let verifier = DocumentVerifier::default();
        assert_eq!(verifier.score("   ", Some("anything")), None);
    }

    #[test]
    fn test_abstract_words() {
        assert_eq!(
            DocumentVerifier::abstract_words("Results: fMRI, EEG;"),
            vec!["results", "fmri", "eeg"]
        );
    }
}
