//! Point-in-time comparison of persisted records against expected values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::store::{LazyStore, Record};

/// Message for the configuration failure
pub const NOT_CONFIGURED: &str = "Supabase not configured";

/// Message when no record matches the conditions
pub const NO_MATCH: &str = "No matching record found";

/// Expected vs stored value for one mismatched column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub expected: Value,
    /// Stored value; `None` when the column is absent from the record
    pub actual: Option<Value>,
}

/// Outcome of one verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub success: bool,

    /// First matching record
    pub actual: Option<Record>,

    #[serde(default)]
    pub expected: Record,

    /// Mismatched columns; absent when everything matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<BTreeMap<String, FieldDiff>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Verification {
    fn failure(expected: &Record, error: impl Into<String>) -> Self {
        Self {
            success: false,
            actual: None,
            expected: expected.clone(),
            diff: None,
            error: Some(error.into()),
        }
    }

    /// Compare `actual` against `expected`
    pub fn compare(actual: Record, expected: &Record) -> Self {
        let diff: BTreeMap<String, FieldDiff> = expected
            .iter()
            .filter(|(key, value)| {
                !actual
                    .get(key.as_str())
                    .is_some_and(|stored| values_match(stored, value))
            })
            .map(|(key, value)| {
                (
                    key.clone(),
                    FieldDiff {
                        expected: value.clone(),
                        actual: actual.get(key.as_str()).cloned(),
                    },
                )
            })
            .collect();

        Self {
            success: diff.is_empty(),
            actual: Some(actual),
            expected: expected.clone(),
            diff: if diff.is_empty() { None } else { Some(diff) },
            error: None,
        }
    }
}

/// Equality where numbers compare by value, so a stored `2.00` matches `2`
fn values_match(stored: &Value, expected: &Value) -> bool {
    match (stored, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (a.as_u64(), b.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_match(x, y)))
        }
        _ => stored == expected,
    }
}

/// Read-only verifier over a lazily created store client
#[derive(Debug, Default)]
pub struct DataVerifier {
    store: LazyStore,
}

impl DataVerifier {
    pub fn new(store: LazyStore) -> Self {
        Self { store }
    }

    /// Fetch the first record of `table` matching `conditions` and diff it against `expected`.
    ///
    /// Never fails: configuration and query problems come back as an
    /// unsuccessful [`Verification`] with `error` set.
    pub fn verify(&self, table: &str, conditions: &Record, expected: &Record) -> Verification {
        if !self.store.is_configured() {
            return Verification::failure(expected, NOT_CONFIGURED);
        }

        let rows = match self
            .store
            .client()
            .and_then(|client| client.select_eq(table, conditions))
        {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(table, error = %err, "store query failed");
                return Verification::failure(expected, err.to_string());
            }
        };

        match rows.into_iter().next() {
            Some(actual) => {
                let verification = Verification::compare(actual, expected);
                tracing::debug!(table, success = verification.success, "verified record");
                verification
            }
            None => Verification::failure(expected, NO_MATCH),
        }
    }
}
