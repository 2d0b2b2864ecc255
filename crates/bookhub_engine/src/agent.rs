//! The per-page agent: decides what a page is and runs the matching flow.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bookhub_core::{
    Collection, EnrichRequest, EnrichedRecord, HarvestSettings, OwnershipStatus, Snapshot,
};
use bookhub_logging::{bookhub_debug, bookhub_info, bookhub_warn};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    extract_product, is_library_page, HarvestSource, RelayClient, SessionResult, SnapshotStore,
    SourceError, SyncSession,
};

/// Query parameter marking a surface opened to run a full sync.
pub const AUTO_SYNC_PARAM: &str = "bookhub_sync";

/// Refresh delays after mount; lazily rendered libraries fill in over seconds.
pub const RETRY_DELAYS_MS: [u64; 4] = [600, 1500, 3000, 5000];

/// `url` with the auto-sync marker appended.
pub fn with_auto_sync(url: &Url) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut().append_pair(AUTO_SYNC_PARAM, "1");
    url
}

pub fn is_auto_sync(url: &Url) -> bool {
    url.query_pairs()
        .any(|(name, value)| name == AUTO_SYNC_PARAM && value == "1")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Keep a live view of the library as it renders.
    Library,
    /// Harvest the whole library, report, and let the coordinator close us.
    AutoSync,
    /// Show enriched metadata for a single product.
    Product,
}

impl AgentMode {
    pub fn for_url(url: &Url) -> Self {
        if is_auto_sync(url) {
            AgentMode::AutoSync
        } else if is_library_page(url) {
            AgentMode::Library
        } else {
            AgentMode::Product
        }
    }
}

/// Re-reads the page and merges what it finds into a live collection.
#[derive(Clone)]
pub struct LibraryRefresher {
    source: Arc<dyn HarvestSource>,
    store: Arc<dyn SnapshotStore>,
    collection: Arc<Mutex<Collection>>,
}

impl LibraryRefresher {
    pub fn new(source: Arc<dyn HarvestSource>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            store,
            collection: Arc::new(Mutex::new(Collection::new())),
        }
    }

    pub fn collection(&self) -> Collection {
        self.lock().clone()
    }

    /// Extract, merge, and checkpoint when something new showed up.
    /// Returns the number of records added.
    pub async fn refresh(&self, reason: &str) -> Result<usize, SourceError> {
        let candidates = self.source.extract().await?;
        let (inserted, snapshot) = {
            let mut collection = self.lock();
            let inserted = collection.absorb(candidates);
            let snapshot = (inserted > 0)
                .then(|| Snapshot::capture(&collection, self.source.url(), Utc::now()));
            (inserted, snapshot)
        };
        bookhub_debug!("refresh ({}): {} new records", reason, inserted);

        if let Some(snapshot) = snapshot {
            if let Err(err) = self.store.write(&snapshot).await {
                bookhub_warn!("library snapshot not written: {}", err);
            }
        }
        Ok(inserted)
    }

    fn lock(&self) -> MutexGuard<'_, Collection> {
        self.collection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps refresh timers and the change listener alive; dropping it stops them.
pub struct RefreshGuard {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshGuard {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until every retry fired and the change feed closed (or the guard was cancelled).
    pub async fn join(mut self) {
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                bookhub_debug!("refresh task ended abnormally: {}", err);
            }
        }
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct PageAgent {
    url: Url,
    source: Arc<dyn HarvestSource>,
    store: Arc<dyn SnapshotStore>,
    relay: RelayClient,
    settings: HarvestSettings,
}

impl PageAgent {
    pub fn new(
        url: Url,
        source: Arc<dyn HarvestSource>,
        store: Arc<dyn SnapshotStore>,
        relay: RelayClient,
    ) -> Self {
        Self {
            url,
            source,
            store,
            relay,
            settings: HarvestSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: HarvestSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn mode(&self) -> AgentMode {
        AgentMode::for_url(&self.url)
    }

    /// Initial refresh, then the retry schedule and one refresh per change
    /// notification until the returned guard is dropped.
    pub async fn mount_library(
        &self,
        mut changes: mpsc::Receiver<()>,
    ) -> (LibraryRefresher, RefreshGuard) {
        let refresher = LibraryRefresher::new(self.source.clone(), self.store.clone());
        if let Err(err) = refresher.refresh("initial").await {
            bookhub_warn!("initial library refresh failed: {}", err);
        }

        let token = CancellationToken::new();
        let mut tasks = Vec::with_capacity(RETRY_DELAYS_MS.len() + 1);
        for delay in RETRY_DELAYS_MS {
            let token = token.clone();
            let refresher = refresher.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {
                        let reason = format!("delayed-retry-{delay}ms");
                        if let Err(err) = refresher.refresh(&reason).await {
                            bookhub_warn!("{} failed: {}", reason, err);
                        }
                    }
                }
            }));
        }

        let listener_token = token.clone();
        let listener = refresher.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = listener_token.cancelled() => break,
                    change = changes.recv() => {
                        if change.is_none() {
                            break;
                        }
                        if let Err(err) = listener.refresh("change-notification").await {
                            bookhub_warn!("change refresh failed: {}", err);
                        }
                    }
                }
            }
        }));

        (refresher, RefreshGuard { token, tasks })
    }

    /// The session auto-sync runs: it reports its end with `autoClose: true`.
    pub fn auto_sync_session(&self) -> SyncSession {
        SyncSession::new(self.source.clone(), self.store.clone(), self.settings)
            .with_notifier(Arc::new(self.relay.clone()), Some(true))
    }

    /// Runs a full auto-sync session.
    pub async fn run_auto_sync(&self) -> SessionResult {
        bookhub_info!("auto-sync requested for {}", self.url);
        let session = self.auto_sync_session();
        let result = session.start().await;
        bookhub_info!("auto-sync for {}: {}", self.url, session.status().summary());
        result
    }

    /// Enriched metadata for the product in `html`; `None` when the page has
    /// no product. Relay failures fall back to the page data.
    pub async fn resolve_product(&self, html: &str) -> Option<EnrichedRecord> {
        let product = extract_product(html, &self.url)?;
        let fallback = EnrichedRecord::local(
            &product.title,
            product.identifier.clone(),
            product.image_url.clone(),
            OwnershipStatus::Checking,
        );
        let request = EnrichRequest {
            title: product.title,
            identifier: product.identifier,
            image_url: product.image_url,
        };
        match self.relay.enrich(request).await {
            Ok(record) => Some(record),
            Err(err) => {
                bookhub_warn!("enrichment unavailable, using page data: {}", err);
                Some(fallback)
            }
        }
    }
}
