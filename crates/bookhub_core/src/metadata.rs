use serde::{Deserialize, Serialize};

use crate::{extract_volume, normalize_title};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    /// Derived locally from the page.
    Dom,
    /// Confirmed by the remote volumes lookup.
    GoogleBooks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipStatus {
    Unlinked,
    #[default]
    Checking,
    Owned,
    NotOwned,
}

/// Book metadata as shown next to a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub source: MetadataSource,
    pub ownership_status: OwnershipStatus,
}

impl EnrichedRecord {
    /// Record built from page data alone; what enrichment falls back to.
    pub fn local(
        title: &str,
        identifier: Option<String>,
        image_url: Option<String>,
        ownership_status: OwnershipStatus,
    ) -> Self {
        Self {
            title: title.to_string(),
            normalized_title: Some(normalize_title(title)),
            volume: extract_volume(title),
            identifier,
            image_url,
            source: MetadataSource::Dom,
            ownership_status,
        }
    }

    /// Overlays a remote title/cover onto this record and marks it confirmed.
    pub fn confirmed(self, remote_title: Option<&str>, remote_image: Option<&str>) -> Self {
        let title = remote_title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or(self.title);
        let volume = extract_volume(&title).or(self.volume);
        Self {
            normalized_title: Some(normalize_title(&title)),
            volume,
            image_url: remote_image
                .filter(|url| !url.is_empty())
                .map(ToOwned::to_owned)
                .or(self.image_url),
            title,
            source: MetadataSource::GoogleBooks,
            identifier: self.identifier,
            ownership_status: self.ownership_status,
        }
    }
}
