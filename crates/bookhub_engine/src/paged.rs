use std::sync::{Arc, Mutex, MutexGuard};

use bookhub_core::Record;
use bookhub_logging::{bookhub_debug, bookhub_info};
use url::Url;

use crate::{
    decode_page, Extractor, FailureKind, Fetcher, HarvestSource, LibraryExtractor, SourceError,
    SourceErrorKind,
};

pub const PAGE_PARAM: &str = "page";

#[derive(Debug, Default)]
struct LoadedPages {
    html: Vec<String>,
    bytes: usize,
    exhausted: bool,
}

/// A paginated HTML listing treated as one growing page.
///
/// Each `reveal_more` loads the next `?page=N`; the extent is the number of
/// decoded bytes loaded so far. A 404 ends the listing without an error.
pub struct PagedHttpSource {
    url: Url,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    loaded: Mutex<LoadedPages>,
}

impl PagedHttpSource {
    pub fn new(url: Url, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            url,
            fetcher,
            extractor: Arc::new(LibraryExtractor::new()),
            loaded: Mutex::new(LoadedPages::default()),
        }
    }

    pub fn pages_loaded(&self) -> usize {
        self.lock().html.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }

    fn page_url(&self, page: usize) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair(PAGE_PARAM, &page.to_string());
        url
    }

    fn lock(&self) -> MutexGuard<'_, LoadedPages> {
        self.loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl HarvestSource for PagedHttpSource {
    fn url(&self) -> String {
        self.url.to_string()
    }

    async fn extent(&self) -> Result<f64, SourceError> {
        Ok(self.lock().bytes as f64)
    }

    async fn reveal_more(&self) -> Result<(), SourceError> {
        let next_page = {
            let loaded = self.lock();
            if loaded.exhausted {
                return Ok(());
            }
            loaded.html.len() + 1
        };

        let url = self.page_url(next_page);
        let output = match self.fetcher.fetch(&url).await {
            Ok(output) => output,
            Err(err) if err.kind == FailureKind::HttpStatus(404) => {
                bookhub_info!("listing ends before page {}", next_page);
                self.lock().exhausted = true;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let page = decode_page(&output.bytes, output.metadata.content_type.as_deref())
            .map_err(|err| SourceError::new(SourceErrorKind::Decode, err.to_string()))?;
        bookhub_debug!(
            "page {} loaded ({} bytes, {})",
            next_page,
            page.html.len(),
            page.encoding_label
        );

        let mut loaded = self.lock();
        loaded.bytes += page.html.len();
        loaded.html.push(page.html);
        Ok(())
    }

    async fn extract(&self) -> Result<Vec<Record>, SourceError> {
        let pages = self.lock().html.clone();
        let mut records = Vec::new();
        for html in &pages {
            records.extend(self.extractor.extract(html, Some(&self.url)));
        }
        Ok(records)
    }

    async fn scroll_to_start(&self) -> Result<(), SourceError> {
        Ok(())
    }
}
