//! Aho–Corasick multi-pattern prefilter over the union of rule keywords.
//!
//! Grounded on the provider's `ahocorasick.Trie` built over
//! `maps.Keys(id.Keywords)` in `runner.go`'s `NewRunner`: one automaton
//! built once at startup, queried per decode pass so rules whose keywords
//! are absent from the buffer are skipped without running their regex.

use std::collections::HashSet;

use aho_corasick::AhoCorasick;

pub struct Prefilter {
    automaton: Option<AhoCorasick>,
    /// Lower-cased patterns, index-aligned with the automaton's pattern ids.
    patterns: Vec<String>,
}

impl Prefilter {
    pub fn new(keywords: &[String]) -> Self {
        let patterns: Vec<String> = keywords.to_vec();
        let automaton = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .ascii_case_insensitive(true)
                    .build(&patterns)
                    .expect("keyword automaton must compile"),
            )
        };
        Self { automaton, patterns }
    }

    /// Returns the set of registered keywords present anywhere in `text`.
    /// `text` should already be lower-cased by the caller (matches the
    /// source's `strings.ToLower(currentRaw)` before the trie scan).
    pub fn matching_keywords(&self, text: &str) -> HashSet<String> {
        let Some(automaton) = &self.automaton else {
            return HashSet::new();
        };
        automaton
            .find_iter(text)
            .map(|m| self.patterns[m.pattern().as_usize()].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn finds_present_keywords_case_insensitively() {
        let pf = Prefilter::new(&kws(&["http://", "https://", "@"]));
        let present = pf.matching_keywords(&"Visit HTTPS://example.com today".to_lowercase());
        assert!(present.contains("https://"));
        assert!(!present.contains("http://"));
        assert!(!present.contains("@"));
    }

    #[test]
    fn empty_keyword_set_matches_nothing() {
        let pf = Prefilter::new(&[]);
        assert!(pf.matching_keywords("anything@example.com").is_empty());
    }

    #[test]
    fn multiple_keywords_in_one_buffer_are_all_reported() {
        let pf = Prefilter::new(&kws(&["http://", "@"]));
        let present = pf.matching_keywords(&"mail me at a@b.com or http://x.example".to_lowercase());
        assert!(present.contains("http://"));
        assert!(present.contains("@"));
    }
}
