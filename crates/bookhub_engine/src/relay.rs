//! Request/response relay between the page agents, the dashboard bridge and
//! the coordinator that owns surface lifecycles.
//!
//! Clients post [`Envelope`]s over an mpsc channel; each envelope carries its
//! own oneshot reply channel, so responses never need correlation ids.
use std::sync::{Arc, Mutex, MutexGuard};

use bookhub_core::{
    update, Ack, EnrichRequest, EnrichResponse, EnrichedRecord, LifecycleEffect, LifecycleMsg,
    LifecycleTable, MessageSender, OpenSurfaceRequest, Request, Snapshot, SurfaceRecord,
    SurfaceResponse, SyncFinished, SyncTrigger, TabId, WindowId,
};
use bookhub_logging::{bookhub_debug, bookhub_info, bookhub_warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::{CompletionNotifier, EnrichmentService, SnapshotStore};

pub const ENVELOPE_BUFFER: usize = 64;

/// One request in flight, with the channel its single response goes to.
#[derive(Debug)]
pub struct Envelope {
    pub sender: MessageSender,
    pub message: Value,
    pub reply: oneshot::Sender<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("coordinator is not running")]
    Closed,
    #[error("request was dropped without a response")]
    Dropped,
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Sending half of the relay, stamped with the identity of its context.
#[derive(Debug, Clone)]
pub struct RelayClient {
    tx: mpsc::Sender<Envelope>,
    sender: MessageSender,
}

/// A detached client and the receiver to hand to [`Coordinator::serve`].
pub fn relay_channel() -> (RelayClient, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(ENVELOPE_BUFFER);
    (
        RelayClient {
            tx,
            sender: MessageSender::detached(),
        },
        rx,
    )
}

impl RelayClient {
    /// Same channel, speaking for the context running in `tab_id`.
    pub fn for_tab(&self, tab_id: TabId) -> Self {
        Self {
            tx: self.tx.clone(),
            sender: MessageSender::from_tab(tab_id),
        }
    }

    /// Sends an arbitrary JSON message and waits for its reply.
    pub async fn send_raw(&self, message: Value) -> Result<Value, RelayError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Envelope {
                sender: self.sender,
                message,
                reply,
            })
            .await
            .map_err(|_| RelayError::Closed)?;
        response.await.map_err(|_| RelayError::Dropped)
    }

    async fn request<T: DeserializeOwned>(&self, request: Request) -> Result<T, RelayError> {
        let message =
            serde_json::to_value(&request).map_err(|err| RelayError::Decode(err.to_string()))?;
        let response = self.send_raw(message).await?;
        serde_json::from_value(response).map_err(|err| RelayError::Decode(err.to_string()))
    }

    pub async fn enrich(&self, request: EnrichRequest) -> Result<EnrichedRecord, RelayError> {
        let response: EnrichResponse = self.request(Request::EnrichRecord(request)).await?;
        Ok(response.record)
    }

    pub async fn open_surface(&self, trigger: SyncTrigger) -> Result<SurfaceResponse, RelayError> {
        self.request(Request::OpenAuxiliarySurface(OpenSurfaceRequest { trigger }))
            .await
    }

    pub async fn sync_finished(&self, finished: SyncFinished) -> Result<Ack, RelayError> {
        self.request(Request::SyncFinished(finished)).await
    }

    pub async fn get_snapshot(&self) -> Result<Option<Snapshot>, RelayError> {
        self.request(Request::GetSnapshot {}).await
    }

    pub async fn start_sync(&self) -> Result<SurfaceResponse, RelayError> {
        self.request(Request::StartSync {}).await
    }
}

#[async_trait::async_trait]
impl CompletionNotifier for RelayClient {
    async fn notify(&self, finished: SyncFinished) {
        if let Err(err) = self.sync_finished(finished).await {
            bookhub_warn!("sync completion not delivered: {}", err);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SurfaceError {
    pub message: String,
}

impl SurfaceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Opens and closes the auxiliary surfaces sync sessions run in.
#[async_trait::async_trait]
pub trait SurfaceHost: Send + Sync {
    async fn open(&self, url: &Url) -> Result<SurfaceRecord, SurfaceError>;
    async fn close_window(&self, window_id: WindowId) -> Result<(), SurfaceError>;
    async fn close_tab(&self, tab_id: TabId) -> Result<(), SurfaceError>;
    /// Ask the host not to reclaim the surface while it is in the background.
    async fn keep_alive(&self, tab_id: TabId) -> Result<(), SurfaceError>;
}

/// Everything the coordinator mutates.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    surfaces: LifecycleTable,
}

/// Background dispatcher. Owns the lifecycle table and the external services.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    host: Arc<dyn SurfaceHost>,
    enricher: Arc<dyn EnrichmentService>,
    store: Arc<dyn SnapshotStore>,
    sync_url: Url,
}

impl Coordinator {
    /// `sync_url` is what new sync surfaces are opened at.
    pub fn new(
        host: Arc<dyn SurfaceHost>,
        enricher: Arc<dyn EnrichmentService>,
        store: Arc<dyn SnapshotStore>,
        sync_url: Url,
    ) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            host,
            enricher,
            store,
            sync_url,
        }
    }

    /// Handles envelopes until every client is gone, one task per envelope.
    pub async fn serve(self: Arc<Self>, mut rx: mpsc::Receiver<Envelope>) {
        bookhub_info!("coordinator listening");
        while let Some(envelope) = rx.recv().await {
            let coordinator = Arc::clone(&self);
            tokio::spawn(async move { coordinator.dispatch(envelope).await });
        }
        bookhub_info!("coordinator stopped: all clients dropped");
    }

    async fn dispatch(&self, envelope: Envelope) {
        let Envelope {
            sender,
            message,
            reply,
        } = envelope;
        let request = match serde_json::from_value::<Request>(message) {
            Ok(request) => request,
            Err(err) => {
                bookhub_debug!("dropping malformed message from {:?}: {}", sender, err);
                return;
            }
        };
        let response = self.handle(sender, request).await;
        if reply.send(response).is_err() {
            bookhub_debug!("requester went away before the response");
        }
    }

    /// Answers one request. Every variant produces a response.
    pub async fn handle(&self, sender: MessageSender, request: Request) -> Value {
        bookhub_debug!("{} from {:?}", request.kind(), sender);
        match request {
            Request::EnrichRecord(request) => {
                let record = self.enricher.enrich(&request).await;
                to_json(&EnrichResponse { record })
            }
            Request::OpenAuxiliarySurface(request) => {
                to_json(&self.open_surface(request.trigger).await)
            }
            Request::StartSync {} => to_json(&self.open_surface(SyncTrigger::Web).await),
            Request::SyncFinished(finished) => {
                self.sync_finished(sender, finished).await;
                to_json(&Ack { ok: true })
            }
            Request::GetSnapshot {} => match self.store.read().await {
                Ok(Some(snapshot)) => to_json(&snapshot),
                Ok(None) => Value::Null,
                Err(err) => {
                    bookhub_warn!("snapshot read failed: {}", err);
                    Value::Null
                }
            },
        }
    }

    async fn open_surface(&self, trigger: SyncTrigger) -> SurfaceResponse {
        let record = match self.host.open(&self.sync_url).await {
            Ok(record) => record,
            Err(err) => {
                bookhub_warn!("could not open sync surface ({:?}): {}", trigger, err);
                return SurfaceResponse::failed(err.message);
            }
        };
        self.apply(LifecycleMsg::SurfaceOpened(record));
        bookhub_info!(
            "sync surface {} opened ({:?}, window {:?})",
            record.tab_id,
            trigger,
            record.window_id
        );
        if let Err(err) = self.host.keep_alive(record.tab_id).await {
            bookhub_debug!("keep-alive refused for {}: {}", record.tab_id, err);
        }
        SurfaceResponse::opened(record.tab_id)
    }

    async fn sync_finished(&self, sender: MessageSender, finished: SyncFinished) {
        bookhub_info!(
            "sync finished in {:?}: success={} total={:?}",
            sender.tab_id,
            finished.success,
            finished.total
        );
        let effects = self.apply(LifecycleMsg::SyncFinished {
            tab_id: sender.tab_id,
            auto_close: finished.auto_close,
        });
        self.run_effects(effects).await;
    }

    /// The host reports a surface closed from outside.
    pub fn surface_removed(&self, tab_id: TabId) {
        let effects = self.apply(LifecycleMsg::SurfaceRemoved { tab_id });
        debug_assert!(effects.is_empty());
    }

    pub fn tracked_surfaces(&self) -> Vec<SurfaceRecord> {
        self.lock().surfaces.surfaces()
    }

    fn apply(&self, msg: LifecycleMsg) -> Vec<LifecycleEffect> {
        let mut state = self.lock();
        let table = std::mem::take(&mut state.surfaces);
        let (table, effects) = update(table, msg);
        state.surfaces = table;
        effects
    }

    async fn run_effects(&self, effects: Vec<LifecycleEffect>) {
        for effect in effects {
            let result = match effect {
                LifecycleEffect::CloseWindow(window_id) => self.host.close_window(window_id).await,
                LifecycleEffect::CloseTab(tab_id) => self.host.close_tab(tab_id).await,
            };
            if let Err(err) = result {
                bookhub_warn!("{:?} failed: {}", effect, err);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        bookhub_warn!("response not serializable: {}", err);
        Value::Null
    })
}
