//! Composite row keys for the ordered column store
//!
//! A row key is a `:`-separated list of fixed-width parts, so comparing two
//! keys byte by byte orders them part by part:
//!
//! - ids are 32 lowercase hex digits; a reversed id spells the same digits
//!   back to front, which spreads sequential ids across the key space while
//!   keeping every row of one subject contiguous
//! - timestamps are microseconds since the epoch, zero-padded to 19 digits,
//!   so lexicographic order equals numeric order
//! - [`KeyPart::MaxTimestamp`] (`i64::MAX` microseconds) sorts after every real
//!   timestamp and bounds "newest available" scans

use crate::error::{TimelineError, TimelineResult};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

pub const SEPARATOR: &str = ":";
pub const TIMESTAMP_WIDTH: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPart {
    Id(Uuid),
    ReversedId(Uuid),
    Timestamp(DateTime<Utc>),
    MaxTimestamp,
}

impl KeyPart {
    fn encode(&self) -> TimelineResult<String> {
        match self {
            KeyPart::Id(id) => Ok(id.simple().to_string()),
            KeyPart::ReversedId(id) => Ok(id.simple().to_string().chars().rev().collect()),
            KeyPart::Timestamp(ts) => encode_micros(ts.timestamp_micros()),
            KeyPart::MaxTimestamp => encode_micros(i64::MAX),
        }
    }
}

fn encode_micros(micros: i64) -> TimelineResult<String> {
    if micros < 0 {
        return Err(TimelineError::ColumnStore(format!(
            "timestamps before the epoch cannot be encoded: {}",
            micros
        )));
    }
    Ok(format!("{:0width$}", micros, width = TIMESTAMP_WIDTH))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(String);

impl RowKey {
    pub fn encode(parts: &[KeyPart]) -> TimelineResult<Self> {
        let encoded = parts
            .iter()
            .map(KeyPart::encode)
            .collect::<TimelineResult<Vec<_>>>()?;
        Ok(Self(encoded.join(SEPARATOR)))
    }

    /// Wrap a key read back from a store
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the timestamp stored at part `index`
    pub fn timestamp_at(&self, index: usize) -> TimelineResult<DateTime<Utc>> {
        self.0
            .split(SEPARATOR)
            .nth(index)
            .filter(|part| part.len() == TIMESTAMP_WIDTH)
            .and_then(|part| part.parse::<i64>().ok())
            .and_then(crate::clock::from_micros)
            .ok_or_else(|| {
                TimelineError::ColumnStore(format!("row key {} has no timestamp at {}", self.0, index))
            })
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
