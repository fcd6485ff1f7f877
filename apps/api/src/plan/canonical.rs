//! Request canonicalization.
//!
//! Reduces an arbitrary portfolio snapshot to the three fields generation is
//! allowed to see and derives the idempotency key from a canonical encoding of
//! them. Object keys are written in sorted order at every depth, so two states
//! that are equal field-for-field always share a key whatever order their
//! source documents listed the keys in.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Prefix of every job record key in the backing store.
pub const KEY_NAMESPACE: &str = "plans:v1:";
/// Visible length of a key: hex characters kept from the SHA-256 digest.
pub const KEY_HEX_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Missing 'state'")]
    MissingState,

    #[error("'state' must be a JSON object")]
    NotAnObject,

    #[error("'{0}' is not a valid plan key")]
    MalformedKey(String),

    #[error("key does not match the submitted state")]
    KeyMismatch,
}

/// The subset of the portfolio snapshot the generation pipeline may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedState {
    pub cash: Value,
    pub benchmarks: Value,
    pub positions: Vec<Value>,
}

/// Idempotency key: the first [`KEY_HEX_LEN`] hex chars of the canonical state digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobKey(String);

impl JobKey {
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let raw = raw.trim();
        let well_formed = raw.len() == KEY_HEX_LEN
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(JobKey(raw.to_string()))
        } else {
            Err(InputError::MalformedKey(raw.chars().take(64).collect()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the job record lives in the store.
    pub fn storage_key(&self) -> String {
        format!("{KEY_NAMESPACE}{}", self.0)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobKey {
    type Error = InputError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        JobKey::parse(&raw)
    }
}

impl From<JobKey> for String {
    fn from(key: JobKey) -> Self {
        key.0
    }
}

impl SanitizedState {
    /// Keeps `cash`, `benchmarks` and `positions`; everything else is dropped.
    /// Positions that are absent or not an array become an empty list.
    pub fn from_raw(raw: &Value) -> Result<Self, InputError> {
        let object = raw.as_object().ok_or(InputError::NotAnObject)?;
        Ok(SanitizedState {
            cash: object.get("cash").cloned().unwrap_or(Value::Null),
            benchmarks: object.get("benchmarks").cloned().unwrap_or(Value::Null),
            positions: match object.get("positions") {
                Some(Value::Array(positions)) => positions.clone(),
                _ => Vec::new(),
            },
        })
    }

    /// Deterministic encoding: sorted keys at every depth, no insignificant whitespace.
    pub fn canonical_json(&self) -> String {
        let mut out = String::new();
        write_canonical(
            &json!({
                "cash": self.cash,
                "benchmarks": self.benchmarks,
                "positions": self.positions,
            }),
            &mut out,
        );
        out
    }

    pub fn key(&self) -> JobKey {
        let digest = Sha256::digest(self.canonical_json().as_bytes());
        let mut hash = hex::encode(digest);
        hash.truncate(KEY_HEX_LEN);
        JobKey(hash)
    }

    /// Uppercased tickers of every position. Nothing outside this set may
    /// appear in a generated document.
    pub fn owned_tickers(&self) -> BTreeSet<String> {
        self.positions
            .iter()
            .filter_map(position_ticker)
            .collect()
    }

    /// Input position record for `ticker` (case-insensitive).
    pub fn position(&self, ticker: &str) -> Option<&Map<String, Value>> {
        self.positions
            .iter()
            .find(|p| position_ticker(p).is_some_and(|t| t.eq_ignore_ascii_case(ticker)))
            .and_then(Value::as_object)
    }

    /// Comparison index configured for `ticker`, exact key first, then case-insensitive.
    pub fn benchmark_for(&self, ticker: &str) -> Option<&str> {
        let benchmarks = self.benchmarks.as_object()?;
        benchmarks
            .get(ticker)
            .or_else(|| {
                benchmarks
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(ticker))
                    .map(|(_, v)| v)
            })
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    pub fn cash_object(&self) -> Option<&Map<String, Value>> {
        self.cash.as_object()
    }
}

/// Canonicalizes a raw request state into its sanitized form and key.
pub fn canonicalize(raw: &Value) -> Result<(SanitizedState, JobKey), InputError> {
    let state = SanitizedState::from_raw(raw)?;
    let key = state.key();
    Ok((state, key))
}

fn position_ticker(position: &Value) -> Option<String> {
    let ticker = position.get("ticker")?.as_str()?.trim();
    (!ticker.is_empty()).then(|| ticker.to_uppercase())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
