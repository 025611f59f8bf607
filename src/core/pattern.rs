// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Path Pattern Compiler
//!
//! Turns the configured wait/expire path lists into comparable matchers.
//! A pattern is either a literal string (exact equality) or, when regex mode
//! is enabled, a compiled regular expression tested against the observed
//! path key. Compilation is idempotent and side-effect free.

use regex::Regex;

use crate::core::error::{JoinWaitError, JoinWaitResult};

/// A single comparable wait/expire pattern
#[derive(Debug, Clone)]
pub enum PathPattern {
    /// Matches by exact string equality
    Literal(String),
    /// Matches when the compiled expression tests true
    Regex(Regex),
}

impl PathPattern {
    /// Test an observed path key against this pattern
    pub fn matches(&self, key: &str) -> bool {
        match self {
            PathPattern::Literal(lit) => lit == key,
            PathPattern::Regex(re) => re.is_match(key),
        }
    }

    /// The configured source text (regex patterns compare by source text)
    pub fn source(&self) -> &str {
        match self {
            PathPattern::Literal(lit) => lit,
            PathPattern::Regex(re) => re.as_str(),
        }
    }
}

/// Compile a pattern list into matchers.
///
/// With `use_regex` set, every entry must be a syntactically valid regular
/// expression; the first invalid entry fails the whole list.
pub fn compile(patterns: &[String], use_regex: bool) -> JoinWaitResult<Vec<PathPattern>> {
    patterns
        .iter()
        .map(|p| {
            if use_regex {
                Regex::new(p)
                    .map(PathPattern::Regex)
                    .map_err(|e| JoinWaitError::InvalidPattern {
                        pattern: p.clone(),
                        source: e,
                    })
            } else {
                Ok(PathPattern::Literal(p.clone()))
            }
        })
        .collect()
}

/// Reject duplicate expire entries.
///
/// Duplicates in the wait spec are meaningful (required multiplicities);
/// duplicates in the expire spec are a configuration error, detected at load
/// and again when a per-event override supplies its own list.
pub fn validate_no_duplicates(expire_patterns: &[String]) -> JoinWaitResult<()> {
    for (i, pattern) in expire_patterns.iter().enumerate() {
        if expire_patterns[..i].contains(pattern) {
            return Err(JoinWaitError::DuplicateExpirePath {
                pattern: pattern.clone(),
            });
        }
    }
    Ok(())
}

/// First index in `patterns` matching `key`, or `None`
pub fn index_of_match(patterns: &[PathPattern], key: &str) -> Option<usize> {
    patterns.iter().position(|p| p.matches(key))
}

/// True when any key in `keys` matches any pattern in `patterns`
pub fn any_match(keys: &[String], patterns: &[PathPattern]) -> bool {
    keys.iter()
        .any(|key| patterns.iter().any(|p| p.matches(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_patterns_match_exactly() {
        let compiled = compile(&["path_1".to_string(), "path_2".to_string()], false).unwrap();
        assert!(compiled[0].matches("path_1"));
        assert!(!compiled[0].matches("path_10"));
        assert!(!compiled[1].matches("path_1"));
    }

    #[test]
    fn test_regex_patterns_match_by_test() {
        let compiled = compile(&["^path_[12]$".to_string()], true).unwrap();
        assert!(compiled[0].matches("path_1"));
        assert!(compiled[0].matches("path_2"));
        assert!(!compiled[0].matches("path_3"));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let result = compile(&["pa(th".to_string()], true);
        match result {
            Err(JoinWaitError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "pa(th"),
            other => panic!("expected InvalidPattern, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_literal_mode_accepts_regex_metacharacters() {
        let compiled = compile(&["pa(th".to_string()], false).unwrap();
        assert!(compiled[0].matches("pa(th"));
    }

    #[test]
    fn test_duplicate_expire_entries_rejected() {
        let patterns = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        match validate_no_duplicates(&patterns) {
            Err(JoinWaitError::DuplicateExpirePath { pattern }) => assert_eq!(pattern, "a"),
            other => panic!("expected DuplicateExpirePath, got {:?}", other),
        }
    }

    #[test]
    fn test_unique_expire_entries_accepted() {
        let patterns = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(validate_no_duplicates(&patterns).is_ok());
    }

    #[test]
    fn test_any_match_scans_all_keys() {
        let compiled = compile(&["stop_.*".to_string()], true).unwrap();
        let keys = vec!["run_1".to_string(), "stop_all".to_string()];
        assert!(any_match(&keys, &compiled));
        assert!(!any_match(&["run_1".to_string()], &compiled));
    }
}
