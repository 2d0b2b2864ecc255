//! Auxiliary surfaces backed by tokio tasks.
//!
//! Each opened surface runs a [`PageAgent`] over a paged HTTP view of its
//! URL. Closing the surface aborts the task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bookhub_core::{HarvestSettings, SessionStatus, SurfaceRecord, TabId, WindowId};
use bookhub_engine::{
    decode_page, AgentMode, Fetcher, PageAgent, PagedHttpSource, RelayClient, SnapshotStore,
    SurfaceError, SurfaceHost, SyncSession,
};
use bookhub_logging::{bookhub_debug, bookhub_info, bookhub_warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// Window ids live in their own range so they never collide with tab ids.
pub const WINDOW_ID_BASE: WindowId = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Closed through the host.
    Closed(TabId),
    /// The surface's agent returned on its own.
    Ended(TabId),
}

struct Surface {
    window_id: WindowId,
    task: JoinHandle<()>,
}

type SurfaceMap = Arc<Mutex<HashMap<TabId, Surface>>>;
type SessionMap = Arc<Mutex<HashMap<TabId, SyncSession>>>;

pub struct TaskSurfaceHost {
    relay: RelayClient,
    store: Arc<dyn SnapshotStore>,
    fetcher: Arc<dyn Fetcher>,
    settings: HarvestSettings,
    next_tab: AtomicU64,
    surfaces: SurfaceMap,
    sessions: SessionMap,
    events: mpsc::UnboundedSender<SurfaceEvent>,
}

impl TaskSurfaceHost {
    pub fn new(
        relay: RelayClient,
        store: Arc<dyn SnapshotStore>,
        fetcher: Arc<dyn Fetcher>,
        settings: HarvestSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let host = Self {
            relay,
            store,
            fetcher,
            settings,
            next_tab: AtomicU64::new(1),
            surfaces: Arc::new(Mutex::new(HashMap::new())),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            events,
        };
        (host, events_rx)
    }

    /// Status of the sync session that ran in `tab_id`, if one was started.
    /// It outlives the surface.
    pub fn session_status(&self, tab_id: TabId) -> Option<SessionStatus> {
        lock(&self.sessions).get(&tab_id).map(SyncSession::status)
    }

    /// Aborts every surface still running.
    pub fn close_all(&self) {
        let drained: Vec<_> = lock(&self.surfaces).drain().collect();
        for (tab_id, surface) in drained {
            bookhub_debug!("aborting surface {}", tab_id);
            surface.task.abort();
        }
    }

    fn close(&self, tab_id: TabId) -> Result<(), SurfaceError> {
        let surface = lock(&self.surfaces)
            .remove(&tab_id)
            .ok_or_else(|| SurfaceError::new(format!("no open surface {tab_id}")))?;
        surface.task.abort();
        bookhub_info!("surface {} closed", tab_id);
        let _ = self.events.send(SurfaceEvent::Closed(tab_id));
        Ok(())
    }
}

#[async_trait::async_trait]
impl SurfaceHost for TaskSurfaceHost {
    async fn open(&self, url: &Url) -> Result<SurfaceRecord, SurfaceError> {
        let tab_id = self.next_tab.fetch_add(1, Ordering::Relaxed);
        let window_id = WINDOW_ID_BASE + tab_id;
        let source = Arc::new(PagedHttpSource::new(url.clone(), self.fetcher.clone()));
        let agent = PageAgent::new(
            url.clone(),
            source,
            self.store.clone(),
            self.relay.for_tab(tab_id),
        )
        .with_settings(self.settings);

        let fetcher = self.fetcher.clone();
        let page = url.clone();
        let surfaces = Arc::clone(&self.surfaces);
        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();

        {
            // Held across the spawn so a fast agent cannot finish before it is registered.
            let mut open = lock(&self.surfaces);
            let task = tokio::spawn(async move {
                run_agent(&agent, fetcher.as_ref(), &page, |session| {
                    lock(&sessions).insert(tab_id, session);
                })
                .await;
                if lock(&surfaces).remove(&tab_id).is_some() {
                    let _ = events.send(SurfaceEvent::Ended(tab_id));
                }
            });
            open.insert(tab_id, Surface { window_id, task });
        }
        bookhub_debug!("surface {} spawned for {}", tab_id, url);

        Ok(SurfaceRecord {
            tab_id,
            window_id: Some(window_id),
        })
    }

    async fn close_window(&self, window_id: WindowId) -> Result<(), SurfaceError> {
        let tab_id = lock(&self.surfaces)
            .iter()
            .find(|(_, surface)| surface.window_id == window_id)
            .map(|(tab_id, _)| *tab_id)
            .ok_or_else(|| SurfaceError::new(format!("no open window {window_id}")))?;
        self.close(tab_id)
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), SurfaceError> {
        self.close(tab_id)
    }

    async fn keep_alive(&self, tab_id: TabId) -> Result<(), SurfaceError> {
        // Task surfaces are never reclaimed while open.
        bookhub_debug!("keep-alive for surface {}", tab_id);
        Ok(())
    }
}

async fn run_agent(
    agent: &PageAgent,
    fetcher: &dyn Fetcher,
    page: &Url,
    register: impl FnOnce(SyncSession),
) {
    match agent.mode() {
        AgentMode::AutoSync => {
            let session = agent.auto_sync_session();
            register(session.clone());
            let result = session.start().await;
            match result {
                Ok(_) => bookhub_info!("{}", session.status().summary()),
                Err(_) => bookhub_warn!("{}", session.status().summary()),
            }
        }
        AgentMode::Library => {
            // No live page to watch; only the retry schedule refreshes.
            let (_, changes) = mpsc::channel(1);
            let (refresher, guard) = agent.mount_library(changes).await;
            guard.join().await;
            bookhub_info!("library view holds {} records", refresher.collection().len());
        }
        AgentMode::Product => {
            let html = match fetcher.fetch(page).await {
                Ok(output) => {
                    match decode_page(&output.bytes, output.metadata.content_type.as_deref()) {
                        Ok(decoded) => decoded.html,
                        Err(err) => {
                            bookhub_warn!("product page {} undecodable: {}", page, err);
                            return;
                        }
                    }
                }
                Err(err) => {
                    bookhub_warn!("product page {} unavailable: {}", page, err);
                    return;
                }
            };
            match agent.resolve_product(&html).await {
                Some(record) => bookhub_info!(
                    "product {:?} resolved from {:?}",
                    record.title,
                    record.source
                ),
                None => bookhub_debug!("{} is not a product page", page),
            }
        }
    }
}

fn lock<T>(map: &Mutex<HashMap<TabId, T>>) -> MutexGuard<'_, HashMap<TabId, T>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
