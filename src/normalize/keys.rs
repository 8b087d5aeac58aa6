//! Surrogate primary-key assignment

use std::collections::{HashMap, HashSet};

/// Result of assigning primary keys to one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAssignment {
    /// One key per row, in row order
    pub keys: Vec<i64>,
    /// Rows that got a key remembered by the registry
    pub reused: usize,
    /// Rows that got a brand-new key
    pub fresh: usize,
}

/// Assigns a primary key to every row of a table
///
/// `existing` holds each row's current key and `natural` its natural key;
/// `known` is the registry's mapping for this table.
///
/// - a row that already has a key keeps it;
/// - otherwise the registry's key for its natural key is reused, unless
///   another row of the table already holds that key;
/// - the rest get new keys above every key seen so far, handed out in
///   reverse row order (the last such row gets the smallest new key).
///
/// Rows keep their keys across runs, and a table whose rows all carry keys
/// comes back unchanged.
pub fn assign_keys(
    existing: &[Option<i64>],
    natural: &[String],
    known: &HashMap<String, i64>,
) -> KeyAssignment {
    debug_assert_eq!(existing.len(), natural.len());

    let mut used: HashSet<i64> = existing.iter().flatten().copied().collect();
    let mut keys: Vec<Option<i64>> = existing.to_vec();
    let mut reused = 0;

    for (slot, natural_key) in keys.iter_mut().zip(natural) {
        if slot.is_some() {
            continue;
        }
        if let Some(&key) = known.get(natural_key) {
            if used.insert(key) {
                *slot = Some(key);
                reused += 1;
            }
        }
    }

    let highest = used
        .iter()
        .chain(known.values())
        .copied()
        .max()
        .unwrap_or(0)
        .max(0);

    let mut next = highest + 1;
    let mut fresh = 0;
    for slot in keys.iter_mut().rev() {
        if slot.is_none() {
            *slot = Some(next);
            next += 1;
            fresh += 1;
        }
    }

    KeyAssignment {
        keys: keys.into_iter().flatten().collect(),
        reused,
        fresh,
    }
}

/// Marks every row whose key repeats the key of an earlier row
///
/// The first row holding a key keeps it. Rows without a key are never
/// marked.
pub fn repeated_keys(existing: &[Option<i64>]) -> Vec<bool> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .map(|key| matches!(key, Some(key) if !seen.insert(*key)))
        .collect()
}
