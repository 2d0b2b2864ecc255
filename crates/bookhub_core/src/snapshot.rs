use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Collection, Record};

/// Fixed storage key of the single persisted snapshot.
pub const SNAPSHOT_KEY: &str = "bookhubKindleLibrarySnapshot";

/// Timestamped export of a collection, replaced wholesale on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    #[serde(rename = "url")]
    pub source_url: String,
    pub total: usize,
    #[serde(rename = "books")]
    pub records: Vec<Record>,
}

impl Snapshot {
    pub fn capture(
        collection: &Collection,
        source_url: impl Into<String>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            taken_at,
            source_url: source_url.into(),
            total: collection.len(),
            records: collection.records().to_vec(),
        }
    }
}
