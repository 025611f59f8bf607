// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Path Matcher
//!
//! Pure completion/redundancy decisions over the ordered list of path-sets
//! currently queued for a correlation group. Two algorithms:
//!
//! - **Any-order**: required occurrence counts per wait pattern, consumed
//!   greedily from the flattened key list. Redundancy is a search over
//!   truncation depths compared by resulting satisfied-signature.
//! - **Exact-order**: a single-cursor scan over the keys in arrival order,
//!   with re-synchronization when a key matches a fresh sequence start.
//!
//! Both functions operate on snapshots and never mutate group state; the
//! caller applies the outcome as one atomic trim.

use crate::core::pattern::{self, PathPattern};

/// Outcome of any-order matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyOrderOutcome {
    /// Every wait pattern's required count is met
    Completed,
    /// Not complete; the oldest `redundant_prefix` queued items are provably
    /// unnecessary and can be evicted without affecting completion
    Incomplete { redundant_prefix: usize },
}

/// Outcome of exact-order matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExactOrderOutcome {
    /// The wait sequence was reproduced in order
    Completed,
    /// Not complete; only the newest `keep_newest` queued items belong to
    /// the current sequence attempt, everything older is evicted. A value
    /// of `0` means no sequence start is engaged and the queue is flushed.
    Incomplete { keep_newest: usize },
}

/// One wait pattern with its accumulated required occurrence count
struct Requirement<'a> {
    pattern: &'a PathPattern,
    required: usize,
}

/// Build the required-count list from the wait spec. Duplicate entries
/// (compared by source text) accumulate, preserving first-seen order.
fn requirements(wait_spec: &[PathPattern]) -> Vec<Requirement<'_>> {
    let mut reqs: Vec<Requirement> = Vec::new();
    for pattern in wait_spec {
        match reqs.iter_mut().find(|r| r.pattern.source() == pattern.source()) {
            Some(req) => req.required += 1,
            None => reqs.push(Requirement {
                pattern,
                required: 1,
            }),
        }
    }
    reqs
}

/// Per-requirement satisfied flags after greedily consuming `keys`.
///
/// Each observed key is consumed by the first requirement (spec order) that
/// matches it and still needs more occurrences; a key feeds at most one
/// requirement.
fn satisfied_signature<'a, I>(keys: I, reqs: &[Requirement<'_>]) -> Vec<bool>
where
    I: Iterator<Item = &'a str>,
{
    let mut counts = vec![0usize; reqs.len()];
    for key in keys {
        let slot = reqs
            .iter()
            .enumerate()
            .position(|(i, r)| counts[i] < r.required && r.pattern.matches(key));
        if let Some(i) = slot {
            counts[i] += 1;
        }
    }
    reqs.iter()
        .enumerate()
        .map(|(i, r)| counts[i] >= r.required)
        .collect()
}

fn flatten_from(items: &[Vec<String>], start: usize) -> impl Iterator<Item = &str> {
    items[start..]
        .iter()
        .flat_map(|keys| keys.iter().map(String::as_str))
}

/// Any-order matching over the queued items' key lists.
///
/// If incomplete, finds how many of the oldest items are redundant: the
/// queue is truncated from the front one item at a time and the satisfied
/// signature recomputed on the remaining suffix; the first depth whose
/// signature differs from the untruncated one marks the boundary — items
/// strictly before it no longer affect the outcome (e.g. a third arrival of
/// a path needing two makes the earliest of the three unnecessary). If no
/// depth changes the signature, nothing is trimmed.
pub fn match_any_order(items: &[Vec<String>], wait_spec: &[PathPattern]) -> AnyOrderOutcome {
    let reqs = requirements(wait_spec);
    let base = satisfied_signature(flatten_from(items, 0), &reqs);
    if base.iter().all(|&met| met) {
        return AnyOrderOutcome::Completed;
    }

    for depth in 1..=items.len() {
        let truncated = satisfied_signature(flatten_from(items, depth), &reqs);
        if truncated != base {
            return AnyOrderOutcome::Incomplete {
                redundant_prefix: depth - 1,
            };
        }
    }

    AnyOrderOutcome::Incomplete {
        redundant_prefix: 0,
    }
}

/// Exact-order matching over the queued items' key lists.
///
/// Scans observed keys in arrival order, tracking `marker` (last matched
/// position in the wait spec) and `pos` (queue index of the current
/// sequence start). A key matching the next spec position advances the
/// cursor; a key matching position 0 restarts the sequence at the current
/// item; a key matching elsewhere in the spec drops the cursor so the scan
/// can re-synchronize instead of failing on a single intruder.
pub fn match_exact_order(items: &[Vec<String>], wait_spec: &[PathPattern]) -> ExactOrderOutcome {
    if wait_spec.is_empty() {
        return ExactOrderOutcome::Completed;
    }

    let mut pos = 0usize;
    let mut marker: Option<usize> = None;

    for (i, keys) in items.iter().enumerate() {
        for key in keys {
            let off_by = marker.map_or(0, |m| m + 1);
            let mut found = pattern::index_of_match(&wait_spec[off_by..], key).map(|x| x + off_by);
            if found.is_none() && off_by > 0 {
                // lost the sequence; see if this key starts over elsewhere
                found = pattern::index_of_match(wait_spec, key);
                if matches!(found, Some(f) if f > 0) {
                    marker = None;
                }
            }

            let index = match found {
                Some(0) => {
                    pos = i;
                    0
                }
                None => continue,
                Some(f) => match marker {
                    None => continue,
                    Some(m) if f < m || f > m + 1 => {
                        marker = None;
                        continue;
                    }
                    Some(_) => f,
                },
            };

            if index + 1 == wait_spec.len() {
                return ExactOrderOutcome::Completed;
            }
            marker = Some(index);
        }
    }

    match marker {
        None => ExactOrderOutcome::Incomplete { keep_newest: 0 },
        Some(_) => ExactOrderOutcome::Incomplete {
            keep_newest: items.len() - pos,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pattern::compile;

    fn spec(patterns: &[&str], use_regex: bool) -> Vec<PathPattern> {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        compile(&owned, use_regex).unwrap()
    }

    fn items(lists: &[&[&str]]) -> Vec<Vec<String>> {
        lists
            .iter()
            .map(|keys| keys.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_any_order_completes_regardless_of_arrival_order() {
        let wait = spec(&["p1", "p2", "p3"], false);
        for order in [["p1", "p3", "p2"], ["p3", "p2", "p1"], ["p2", "p1", "p3"]] {
            let queued = items(&[&[order[0]], &[order[1]], &[order[2]]]);
            assert_eq!(match_any_order(&queued, &wait), AnyOrderOutcome::Completed);
        }
    }

    #[test]
    fn test_any_order_incomplete_keeps_partial_progress() {
        let wait = spec(&["p1", "p2"], false);
        let queued = items(&[&["p1"]]);
        assert_eq!(
            match_any_order(&queued, &wait),
            AnyOrderOutcome::Incomplete {
                redundant_prefix: 0
            }
        );
    }

    #[test]
    fn test_any_order_duplicate_quota_marks_extra_arrival_redundant() {
        // wait [p1,p1,p2,p2]: a third p1 makes the earliest one unnecessary
        let wait = spec(&["p1", "p1", "p2", "p2"], false);
        let queued = items(&[&["p1"], &["p1"], &["p1"]]);
        assert_eq!(
            match_any_order(&queued, &wait),
            AnyOrderOutcome::Incomplete {
                redundant_prefix: 1
            }
        );
    }

    #[test]
    fn test_any_order_over_quota_on_single_pattern() {
        let wait = spec(&["p1", "p2"], false);
        let queued = items(&[&["p1"], &["p1"]]);
        // second p1 keeps p1 satisfied on its own; the first is redundant
        assert_eq!(
            match_any_order(&queued, &wait),
            AnyOrderOutcome::Incomplete {
                redundant_prefix: 1
            }
        );
    }

    #[test]
    fn test_any_order_multi_key_items_flatten() {
        let wait = spec(&["p1", "p2", "p3"], false);
        let queued = items(&[&["p1", "p2"], &["p3"]]);
        assert_eq!(match_any_order(&queued, &wait), AnyOrderOutcome::Completed);
    }

    #[test]
    fn test_any_order_duplicate_quota_counts() {
        let wait = spec(&["p1", "p1", "p2"], false);
        let not_enough = items(&[&["p1"], &["p2"]]);
        assert!(matches!(
            match_any_order(&not_enough, &wait),
            AnyOrderOutcome::Incomplete { .. }
        ));

        let enough = items(&[&["p1"], &["p2"], &["p1"]]);
        assert_eq!(match_any_order(&enough, &wait), AnyOrderOutcome::Completed);
    }

    #[test]
    fn test_any_order_regex_first_declared_pattern_wins() {
        let wait = spec(&["^p[0-9]$", "^p1$"], true);
        // "p1" feeds the first (broad) pattern, "p2" can't feed "^p1$"
        let queued = items(&[&["p1"], &["p2"]]);
        assert!(matches!(
            match_any_order(&queued, &wait),
            AnyOrderOutcome::Incomplete { .. }
        ));

        let completed = items(&[&["p2"], &["p1"]]);
        assert_eq!(
            match_any_order(&completed, &wait),
            AnyOrderOutcome::Completed
        );
    }

    #[test]
    fn test_exact_order_completes_in_sequence() {
        let wait = spec(&["p1", "p2", "p3"], false);
        let queued = items(&[&["p1"], &["p2"], &["p3"]]);
        assert_eq!(
            match_exact_order(&queued, &wait),
            ExactOrderOutcome::Completed
        );
    }

    #[test]
    fn test_exact_order_out_of_sequence_is_not_complete() {
        let wait = spec(&["p1", "p2", "p3"], false);
        let queued = items(&[&["p1"], &["p3"], &["p2"]]);
        assert_ne!(
            match_exact_order(&queued, &wait),
            ExactOrderOutcome::Completed
        );
    }

    #[test]
    fn test_exact_order_unengaged_cursor_flushes_queue() {
        // first key matches position 1, never position 0: nothing to keep
        let wait = spec(&["p1", "p2"], false);
        let queued = items(&[&["p2"]]);
        assert_eq!(
            match_exact_order(&queued, &wait),
            ExactOrderOutcome::Incomplete { keep_newest: 0 }
        );
    }

    #[test]
    fn test_exact_order_keeps_items_from_sequence_start() {
        let wait = spec(&["p1", "p2", "p3"], false);
        // a second p1 restarts the sequence at queue index 2
        let queued = items(&[&["p1"], &["p2"], &["p1"]]);
        assert_eq!(
            match_exact_order(&queued, &wait),
            ExactOrderOutcome::Incomplete { keep_newest: 1 }
        );
    }

    #[test]
    fn test_exact_order_recovers_from_unknown_intruder() {
        // an unrelated key must not break an in-progress sequence
        let wait = spec(&["^p1$", "^p2$", "^p3$"], true);
        let partial = items(&[&["p1"], &["p2"], &["other"]]);
        assert_eq!(
            match_exact_order(&partial, &wait),
            ExactOrderOutcome::Incomplete { keep_newest: 3 }
        );

        let completed = items(&[&["p1"], &["p2"], &["other"], &["p3"]]);
        assert_eq!(
            match_exact_order(&completed, &wait),
            ExactOrderOutcome::Completed
        );
    }

    #[test]
    fn test_exact_order_internal_repeats() {
        // spec with internal repeats completes only on the full sequence
        let wait = spec(&["p1", "p2", "p1", "p3"], false);
        let queued = items(&[&["p1"], &["p2"], &["p1"], &["p3"]]);
        assert_eq!(
            match_exact_order(&queued, &wait),
            ExactOrderOutcome::Completed
        );
    }

    #[test]
    fn test_exact_order_single_pattern_completes_immediately() {
        let wait = spec(&["p1"], false);
        let queued = items(&[&["p1"]]);
        assert_eq!(
            match_exact_order(&queued, &wait),
            ExactOrderOutcome::Completed
        );
    }

    #[test]
    fn test_exact_order_skip_ahead_resets_cursor() {
        // jumping from position 0 straight to position 2 drops the cursor
        let wait = spec(&["p1", "p2", "p3", "p4"], false);
        let queued = items(&[&["p1"], &["p3"]]);
        assert_eq!(
            match_exact_order(&queued, &wait),
            ExactOrderOutcome::Incomplete { keep_newest: 0 }
        );
    }

    #[test]
    fn test_redundancy_never_blocks_future_completion() {
        // after trimming the redundant prefix, the remaining items plus the
        // still-missing arrivals must complete the group
        let wait = spec(&["p1", "p1", "p2", "p2"], false);
        let queued = items(&[&["p1"], &["p1"], &["p1"]]);
        let outcome = match_any_order(&queued, &wait);
        let AnyOrderOutcome::Incomplete { redundant_prefix } = outcome else {
            panic!("expected incomplete, got {outcome:?}");
        };

        let mut remaining = queued[redundant_prefix..].to_vec();
        remaining.push(vec!["p2".to_string()]);
        remaining.push(vec!["p2".to_string()]);
        assert_eq!(
            match_any_order(&remaining, &wait),
            AnyOrderOutcome::Completed
        );
    }
}
