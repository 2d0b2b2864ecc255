use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest title a harvested record may carry, in characters.
pub const MAX_TITLE_CHARS: usize = 180;

/// Title used when a node has an identifier but no readable title.
pub const PLACEHOLDER_TITLE: &str = "Unknown title";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record title is empty")]
    EmptyTitle,
    #[error("record title has {chars} chars (max {MAX_TITLE_CHARS})")]
    TitleTooLong { chars: usize },
}

/// One harvested library entry.
///
/// Deserialization goes through [`Record::new`], so stored records obey the
/// same title rules as freshly extracted ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredRecord")]
pub struct Record {
    pub title: String,
    pub identifier: Option<String>,
    pub image_url: Option<String>,
    pub detail_url: Option<String>,
}

impl Record {
    pub fn new(
        title: impl Into<String>,
        identifier: Option<String>,
        image_url: Option<String>,
        detail_url: Option<String>,
    ) -> Result<Self, RecordError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(RecordError::EmptyTitle);
        }
        let chars = title.chars().count();
        if chars > MAX_TITLE_CHARS {
            return Err(RecordError::TitleTooLong { chars });
        }
        Ok(Self {
            title,
            identifier,
            image_url,
            detail_url,
        })
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::for_record(self)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    title: String,
    identifier: Option<String>,
    image_url: Option<String>,
    detail_url: Option<String>,
}

impl TryFrom<StoredRecord> for Record {
    type Error = RecordError;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        Record::new(
            stored.title,
            stored.identifier,
            stored.image_url,
            stored.detail_url,
        )
    }
}

/// Canonical dedup identity: the identifier when known, else `title|image_url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn for_record(record: &Record) -> Self {
        match record.identifier.as_deref() {
            Some(identifier) => Self(identifier.to_string()),
            None => Self(format!(
                "{}|{}",
                record.title,
                record.image_url.as_deref().unwrap_or("")
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
