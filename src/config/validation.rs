//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree and compare against known field names. Unknown keys
//! are collected with a "did you mean?" suggestion and reject the file.
//! Only then does normal serde deserialization run.
//!
//! Stage property tables are opaque here; their names depend on the stage
//! kind and are checked against that kind's schema when the graph is built.

use crate::error::UnknownKey;
use std::collections::{BTreeSet, HashSet};

// ============================================================================
// Known Config Keys
// ============================================================================

/// Tables whose contents are not part of the file schema.
const OPAQUE_TABLES: &[&str] = &["stages.properties"];

/// Returns the complete set of valid dotted key paths for `PipelineConfig`.
///
/// Array-of-table entries share one path (`stages.name`, not `stages.0.name`).
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [pipeline]
        "pipeline",
        "pipeline.name",
        // [[stages]]
        "stages",
        "stages.name",
        "stages.kind",
        "stages.properties",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`. Tables inside arrays are walked under the array's
/// own path, and each path is reported once.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = BTreeSet::new();
    collect_keys(value, prefix, &mut keys);
    keys.into_iter().collect()
}

fn collect_keys(value: &toml::Value, prefix: &str, keys: &mut BTreeSet<String>) {
    let Some(table) = value.as_table() else {
        return;
    };
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        keys.insert(path.clone());
        if OPAQUE_TABLES.contains(&path.as_str()) {
            continue;
        }
        match v {
            toml::Value::Table(_) => collect_keys(v, &path, keys),
            toml::Value::Array(items) => {
                for item in items.iter().filter(|i| i.is_table()) {
                    collect_keys(item, &path, keys);
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties go to the alphabetically first candidate so the answer is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return every key that is not in the schema.
///
/// Syntax errors yield an empty list; serde reports them with location on
/// the second pass.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<UnknownKey> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| UnknownKey {
            suggestion: suggest_correction(&key, &known),
            path: key,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
