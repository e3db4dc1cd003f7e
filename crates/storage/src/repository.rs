use std::collections::BTreeMap;
use std::path::PathBuf;

use recall_core::model::{CardError, CardId, CardRecord, LeitnerBox, MediaRef};
use recall_core::time::{from_unix_seconds, to_unix_seconds};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the progress store and its save worker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("card not found: {0}")]
    NotFound(CardId),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("save worker unavailable: {0}")]
    Worker(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Persisted shape for a card's progress.
///
/// The on-disk form keeps `due` as fractional Unix seconds so files written
/// by older tools (integer or float dues, `file_a`/`file_b` keys) still load.
/// Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(rename = "box")]
    pub leitner_box: u8,
    #[serde(default)]
    pub due: f64,
    #[serde(alias = "file_a")]
    pub front_ref: String,
    #[serde(alias = "file_b")]
    pub back_ref: String,
}

/// Why a persisted entry could not be converted back into a record.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum RecordError {
    #[error(transparent)]
    Card(#[from] CardError),

    #[error("due is not a representable timestamp: {0}")]
    InvalidDue(f64),

    #[error("malformed entry: {0}")]
    Malformed(String),
}

impl PersistedRecord {
    #[must_use]
    pub fn from_record(record: &CardRecord) -> Self {
        Self {
            leitner_box: record.leitner_box().value(),
            due: to_unix_seconds(record.due()),
            front_ref: record.front().as_str().to_owned(),
            back_ref: record.back().as_str().to_owned(),
        }
    }

    /// Decode one entry of a progress file into a record.
    ///
    /// Entries are decoded one at a time so a single bad value (a negative
    /// box, a `null` due) costs only that card.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Malformed` if the entry does not have the
    /// persisted shape, otherwise the errors of [`PersistedRecord::into_record`].
    pub fn parse_entry(value: serde_json::Value) -> Result<CardRecord, RecordError> {
        let persisted: Self =
            serde_json::from_value(value).map_err(|e| RecordError::Malformed(e.to_string()))?;
        persisted.into_record()
    }

    /// Convert the persisted entry back into a domain `CardRecord`.
    ///
    /// # Errors
    ///
    /// Returns `RecordError` if the box is out of range or the due time is unrepresentable.
    pub fn into_record(self) -> Result<CardRecord, RecordError> {
        let leitner_box = LeitnerBox::new(self.leitner_box)?;
        let due = from_unix_seconds(self.due).ok_or(RecordError::InvalidDue(self.due))?;
        Ok(CardRecord::from_persisted(
            leitner_box,
            due,
            MediaRef::new(self.front_ref),
            MediaRef::new(self.back_ref),
        ))
    }
}

/// The whole progress file: card id → persisted record.
pub type PersistedProgress = BTreeMap<String, PersistedRecord>;

/// Snapshot a record map into its persisted form.
#[must_use]
pub fn to_persisted<'a>(
    records: impl IntoIterator<Item = (&'a CardId, &'a CardRecord)>,
) -> PersistedProgress {
    records
        .into_iter()
        .map(|(id, record)| (id.as_str().to_owned(), PersistedRecord::from_record(record)))
        .collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::time::{epoch, fixed_now};

    #[test]
    fn record_converts_both_ways() {
        let record = CardRecord::from_persisted(
            LeitnerBox::REVIEW,
            fixed_now() + chrono::Duration::microseconds(250),
            MediaRef::new("audio/0001_A_Gato.mp3"),
            MediaRef::new("audio/0001_B_Eng_Cat.mp3"),
        );
        let persisted = PersistedRecord::from_record(&record);
        assert_eq!(persisted.leitner_box, 2);
        assert_eq!(persisted.into_record().unwrap(), record);
    }

    #[test]
    fn legacy_keys_and_integer_due_are_accepted() {
        let json = r#"{"box": 0, "due": 0, "file_a": "a.mp3", "file_b": "b.mp3", "extra": true}"#;
        let persisted: PersistedRecord = serde_json::from_str(json).unwrap();
        assert_eq!(persisted.front_ref, "a.mp3");
        let record = persisted.into_record().unwrap();
        assert_eq!(record.due(), epoch());
        assert_eq!(record.leitner_box(), LeitnerBox::NEW);
    }

    #[test]
    fn entries_with_wrong_value_types_are_malformed() {
        for json in [
            r#"{"box": -1, "due": 0, "front_ref": "a", "back_ref": "b"}"#,
            r#"{"box": 256, "due": 0, "front_ref": "a", "back_ref": "b"}"#,
            r#"{"box": 1, "due": null, "front_ref": "a", "back_ref": "b"}"#,
            r#"{"box": 1, "due": 0}"#,
            r#""not an object""#,
        ] {
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            assert!(
                matches!(PersistedRecord::parse_entry(value), Err(RecordError::Malformed(_))),
                "{json}"
            );
        }
    }

    #[test]
    fn out_of_range_box_is_rejected() {
        let persisted = PersistedRecord {
            leitner_box: 7,
            due: 0.0,
            front_ref: "a".into(),
            back_ref: "b".into(),
        };
        assert!(matches!(
            persisted.into_record(),
            Err(RecordError::Card(CardError::InvalidBox { provided: 7, .. }))
        ));
    }
}
