use std::time::Duration;

use bookhub_core::{EnrichRequest, EnrichedRecord, OwnershipStatus};
use bookhub_logging::{bookhub_debug, bookhub_warn};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_VOLUMES_ENDPOINT: &str = "https://www.googleapis.com/books/v1/volumes";

/// Best-effort metadata lookup; never fails, falls back to the local record.
#[async_trait::async_trait]
pub trait EnrichmentService: Send + Sync {
    async fn enrich(&self, request: &EnrichRequest) -> EnrichedRecord;
}

#[derive(Debug, Clone)]
pub struct EnrichSettings {
    pub endpoint: String,
    pub language: String,
    pub connect_timeout: Duration,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_VOLUMES_ENDPOINT.to_string(),
            language: "ja".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<VolumeItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeItem {
    #[serde(default)]
    volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

/// Looks titles up on a Google-Books-compatible `volumes` endpoint.
#[derive(Debug, Clone)]
pub struct BooksApiEnricher {
    client: reqwest::Client,
    settings: EnrichSettings,
}

impl BooksApiEnricher {
    pub fn new(settings: EnrichSettings) -> Self {
        // A builder failure leaves us with the default client rather than no enrichment at all.
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .unwrap_or_else(|err| {
                bookhub_warn!("falling back to default http client: {}", err);
                reqwest::Client::new()
            });
        Self { client, settings }
    }

    async fn lookup(&self, normalized_title: &str) -> Result<Option<VolumeInfo>, String> {
        let query = format!("intitle:{normalized_title}");
        let url = Url::parse_with_params(
            &self.settings.endpoint,
            &[
                ("q", query.as_str()),
                ("langRestrict", self.settings.language.as_str()),
                ("maxResults", "1"),
            ],
        )
        .map_err(|err| err.to_string())?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("http status {status}"));
        }
        let body = response.bytes().await.map_err(|err| err.to_string())?;
        let parsed: VolumesResponse =
            serde_json::from_slice(&body).map_err(|err| err.to_string())?;
        Ok(parsed.items.into_iter().next().and_then(|item| item.volume_info))
    }
}

#[async_trait::async_trait]
impl EnrichmentService for BooksApiEnricher {
    async fn enrich(&self, request: &EnrichRequest) -> EnrichedRecord {
        let fallback = EnrichedRecord::local(
            &request.title,
            request.identifier.clone(),
            request.image_url.clone(),
            OwnershipStatus::Checking,
        );
        let normalized = fallback
            .normalized_title
            .clone()
            .unwrap_or_else(|| request.title.clone());

        match self.lookup(&normalized).await {
            Ok(Some(info)) => {
                let image = info
                    .image_links
                    .as_ref()
                    .and_then(|links| links.thumbnail.clone().or(links.small_thumbnail.clone()));
                fallback.confirmed(info.title.as_deref(), image.as_deref())
            }
            Ok(None) => {
                bookhub_debug!("no volume found for {:?}", normalized);
                fallback
            }
            Err(err) => {
                bookhub_warn!("enrichment lookup failed for {:?}: {}", normalized, err);
                fallback
            }
        }
    }
}

/// Enrichment that never leaves the process; used when no endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEnricher;

#[async_trait::async_trait]
impl EnrichmentService for LocalEnricher {
    async fn enrich(&self, request: &EnrichRequest) -> EnrichedRecord {
        EnrichedRecord::local(
            &request.title,
            request.identifier.clone(),
            request.image_url.clone(),
            OwnershipStatus::Checking,
        )
    }
}
