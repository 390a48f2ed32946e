//! Record codec
//!
//! Records are stored as JSON strings. Decoding is strict: a field that is
//! missing or has the wrong shape fails the whole record, which callers treat
//! as a corrupted entry.
//!
//! List entries carry their ordering score in front of the JSON body,
//! `{score}|{json}`, so the store can compare a new entry with the list head
//! without understanding the record.

use crate::{CacheError, CacheResult};
use serde::{de::DeserializeOwned, Serialize};

/// Separates an entry's score from its JSON body
pub const ENTRY_SEPARATOR: char = '|';

/// A record kept in a newest-first cached list
pub trait ListRecord {
    /// Ordering score; a newer record has a strictly greater score.
    /// Timestamped records use microseconds since the epoch.
    fn sort_key(&self) -> i64;
}

pub fn encode<T: Serialize>(record: &T) -> CacheResult<String> {
    Ok(serde_json::to_string(record)?)
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> CacheResult<T> {
    Ok(serde_json::from_str(raw)?)
}

pub fn encode_entry<T: Serialize + ListRecord>(record: &T) -> CacheResult<String> {
    Ok(format!("{}{}{}", record.sort_key(), ENTRY_SEPARATOR, encode(record)?))
}

pub fn encode_entries<T: Serialize + ListRecord>(records: &[T]) -> CacheResult<Vec<String>> {
    records.iter().map(encode_entry).collect()
}

/// Score of a stored list entry, `None` when the entry is malformed
pub fn entry_score(raw: &str) -> Option<i64> {
    let (score, _) = raw.split_once(ENTRY_SEPARATOR)?;
    score.parse().ok()
}

pub fn decode_entry<T: DeserializeOwned>(raw: &str) -> CacheResult<T> {
    match raw.split_once(ENTRY_SEPARATOR) {
        Some((score, body)) if score.parse::<i64>().is_ok() => decode(body),
        _ => Err(CacheError::InvalidData(format!(
            "list entry has no score prefix: {:.32}",
            raw
        ))),
    }
}

/// Decode a whole cached list; the first bad entry fails the batch
pub fn decode_entries<T: DeserializeOwned>(raw: &[String]) -> CacheResult<Vec<T>> {
    raw.iter().map(|item| decode_entry(item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: Uuid,
        created_at: DateTime<Utc>,
    }

    #[test]
    fn test_timestamps_keep_microseconds() {
        let created_at = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        let entry = Entry {
            id: Uuid::new_v4(),
            created_at,
        };

        let decoded: Entry = decode(&encode(&entry).unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let raw = format!(r#"{{"id":"{}"}}"#, Uuid::new_v4());
        assert!(decode::<Entry>(&raw).is_err());
    }

    #[test]
    fn test_decode_entries_fails_on_any_bad_element() {
        let good = encode_entry(&Entry {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        })
        .unwrap();
        let raw = vec![good, "7|not json".to_string()];
        assert!(decode_entries::<Entry>(&raw).is_err());
    }

    impl ListRecord for Entry {
        fn sort_key(&self) -> i64 {
            self.created_at.timestamp_micros()
        }
    }

    #[test]
    fn test_list_entry_carries_score() {
        let entry = Entry {
            id: Uuid::new_v4(),
            created_at: Utc.timestamp_opt(1_700_000_000, 5_000).unwrap(),
        };

        let raw = encode_entry(&entry).unwrap();
        assert!(raw.starts_with("1700000000000005|{"));
        assert_eq!(entry_score(&raw), Some(1_700_000_000_000_005));
        assert_eq!(decode_entry::<Entry>(&raw).unwrap(), entry);
    }

    #[test]
    fn test_entry_without_score_is_invalid() {
        let body = encode(&Entry {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        })
        .unwrap();

        assert_eq!(entry_score(&body), None);
        assert!(matches!(
            decode_entry::<Entry>(&body),
            Err(CacheError::InvalidData(_))
        ));
    }
}
