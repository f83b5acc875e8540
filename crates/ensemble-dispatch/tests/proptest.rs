//! Property-based tests for the part registry using proptest.

use proptest::prelude::*;
use ensemble_dispatch::{Lookup, PartRegistry};

// ============================================================================
// Test helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Insert(String),
    Remove(String),
}

// A small alphabet so that shared prefixes and name-is-prefix-of-name
// cases come up often.
fn name_strategy() -> impl Strategy<Value = String> {
    "[abc]{1,4}"
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => name_strategy().prop_map(Op::Insert),
        1 => name_strategy().prop_map(Op::Remove),
    ]
}

fn apply(ops: &[Op]) -> PartRegistry<usize> {
    let mut registry = PartRegistry::new();
    for (i, op) in ops.iter().enumerate() {
        match op {
            Op::Insert(name) => {
                let _ = registry.insert(name, i);
            }
            Op::Remove(name) => {
                registry.remove(name);
            }
        }
    }
    registry
}

fn prefix(name: &str, k: usize) -> String {
    name.chars().take(k).collect()
}

/// Smallest k such that no other name shares the first k characters of
/// `name`, or the full length when `name` is a prefix of a sibling.
fn brute_force_min_chars(name: &str, names: &[String]) -> usize {
    let len = name.chars().count();
    (1..=len)
        .find(|&k| {
            let p = prefix(name, k);
            names
                .iter()
                .filter(|other| other.as_str() != name)
                .all(|other| prefix(other, k) != p)
        })
        .unwrap_or(len)
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// Any mix of inserts and removes leaves names sorted and unique.
    #[test]
    fn stays_sorted_without_duplicates(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let registry = apply(&ops);
        let names: Vec<&str> = registry.names().collect();
        for pair in names.windows(2) {
            prop_assert!(pair[0] < pair[1], "{:?} not strictly sorted", names);
        }
    }

    /// Cached min_chars always equals the brute-force minimum.
    #[test]
    fn min_chars_is_minimal(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let registry = apply(&ops);
        let names: Vec<String> = registry.names().map(String::from).collect();
        for entry in registry.iter() {
            let len = entry.name().chars().count();
            prop_assert!(entry.min_chars() >= 1);
            prop_assert!(entry.min_chars() <= len);
            prop_assert_eq!(
                entry.min_chars(),
                brute_force_min_chars(entry.name(), &names),
                "min_chars of {:?} in {:?}", entry.name(), names
            );
        }
    }

    /// The full name always finds its own entry.
    #[test]
    fn full_name_round_trip(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let registry = apply(&ops);
        for entry in registry.iter() {
            let lookup = registry.find(entry.name());
            prop_assert_eq!(lookup.found_name(), Some(entry.name()));
        }
    }

    /// A prefix of min_chars characters selects the entry.
    #[test]
    fn min_chars_prefix_selects_entry(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let registry = apply(&ops);
        for entry in registry.iter() {
            let p = prefix(entry.name(), entry.min_chars());
            let lookup = registry.find(&p);
            prop_assert_eq!(lookup.found_name(), Some(entry.name()));
        }
    }

    /// A prefix shorter than min_chars never silently picks the entry
    /// unless that entry's name is the prefix itself.
    #[test]
    fn shorter_prefix_is_not_unique(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let registry = apply(&ops);
        for entry in registry.iter() {
            if entry.min_chars() < 2 {
                continue;
            }
            let p = prefix(entry.name(), entry.min_chars() - 1);
            match registry.find(&p) {
                Lookup::Found(found) => prop_assert_eq!(found.name(), p.as_str()),
                Lookup::Ambiguous(candidates) => prop_assert!(candidates.len() >= 2),
                Lookup::NotFound => prop_assert!(false, "prefix {:?} of an existing name not found", p),
            }
        }
    }

    /// Lookups never report a name that does not start with the prefix.
    #[test]
    fn lookup_results_share_prefix(
        ops in prop::collection::vec(op_strategy(), 0..60),
        typed in "[abcd]{1,3}",
    ) {
        let registry = apply(&ops);
        match registry.find(&typed) {
            Lookup::Found(entry) => prop_assert!(entry.name().starts_with(&typed)),
            Lookup::Ambiguous(candidates) => {
                for entry in candidates {
                    prop_assert!(entry.name().starts_with(&typed));
                }
            }
            Lookup::NotFound => {
                prop_assert!(registry.names().all(|n| !n.starts_with(&typed)));
            }
        }
    }
}
