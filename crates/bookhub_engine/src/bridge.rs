//! Bridge between the web dashboard page and the relay.
//!
//! The dashboard and the bridge share a page message channel ([`PageWindow`]).
//! Dashboard requests carry `source: "bookhub-web"`; bridge replies carry
//! `source: "bookhub-extension"`.
use bookhub_core::{Snapshot, SurfaceResponse, WindowId};
use bookhub_logging::{bookhub_debug, bookhub_warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::RelayClient;

pub const DASHBOARD_SOURCE: &str = "bookhub-web";
pub const EXTENSION_SOURCE: &str = "bookhub-extension";

pub const GET_SNAPSHOT: &str = "BOOKHUB_GET_SNAPSHOT";
pub const START_SYNC: &str = "BOOKHUB_START_SYNC";
pub const SNAPSHOT: &str = "BOOKHUB_SNAPSHOT";
pub const START_SYNC_RESULT: &str = "BOOKHUB_START_SYNC_RESULT";

const PAGE_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMessage {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl PageMessage {
    pub fn from_dashboard(kind: &str) -> Self {
        Self {
            source: DASHBOARD_SOURCE.to_string(),
            kind: kind.to_string(),
            payload: None,
        }
    }

    pub fn from_extension(kind: &str, payload: Value) -> Self {
        Self {
            source: EXTENSION_SOURCE.to_string(),
            kind: kind.to_string(),
            payload: Some(payload),
        }
    }
}

/// A message as observed by a page listener.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEvent {
    /// Window that posted the message.
    pub source_window: WindowId,
    pub origin: String,
    pub data: Value,
}

/// Message channel of one page window, shared by every script in the page.
#[derive(Debug, Clone)]
pub struct PageWindow {
    id: WindowId,
    origin: String,
    tx: broadcast::Sender<PageEvent>,
}

impl PageWindow {
    pub fn new(id: WindowId, origin: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(PAGE_CHANNEL_CAPACITY);
        Self {
            id,
            origin: origin.into(),
            tx,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.tx.subscribe()
    }

    /// Posts `data` from this window to its own origin.
    pub fn post_message(&self, data: Value) {
        self.dispatch(PageEvent {
            source_window: self.id,
            origin: self.origin.clone(),
            data,
        });
    }

    /// Delivers an event as-is, e.g. one posted by a frame or another origin.
    pub fn dispatch(&self, event: PageEvent) {
        // No listeners is not an error for a page.
        let _ = self.tx.send(event);
    }

    /// A handle that can post while the page lives but does not keep it alive.
    fn downgrade(&self) -> WeakPageWindow {
        WeakPageWindow {
            id: self.id,
            origin: self.origin.clone(),
            tx: self.tx.downgrade(),
        }
    }
}

#[derive(Clone)]
struct WeakPageWindow {
    id: WindowId,
    origin: String,
    tx: broadcast::WeakSender<PageEvent>,
}

impl WeakPageWindow {
    fn upgrade(&self) -> Option<PageWindow> {
        self.tx.upgrade().map(|tx| PageWindow {
            id: self.id,
            origin: self.origin.clone(),
            tx,
        })
    }

    fn is_own(&self, event: &PageEvent) -> bool {
        event.source_window == self.id && event.origin == self.origin
    }
}

/// Answers dashboard requests by forwarding them over the relay.
///
/// The listener stops when the bridge is dropped or every handle on the page
/// window is gone.
pub struct DashboardBridge {
    relay: RelayClient,
    installed: bool,
    token: CancellationToken,
}

impl DashboardBridge {
    pub fn new(relay: RelayClient) -> Self {
        Self {
            relay,
            installed: false,
            token: CancellationToken::new(),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Starts listening on `window`. Only the first call installs a listener;
    /// later calls return `None`.
    pub fn install(&mut self, window: &PageWindow) -> Option<JoinHandle<()>> {
        if self.installed {
            bookhub_debug!("dashboard bridge already installed");
            return None;
        }
        self.installed = true;

        let mut events = window.subscribe();
        let page = window.downgrade();
        let relay = self.relay.clone();
        let token = self.token.clone();
        Some(tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => break,
                    received = events.recv() => received,
                };
                match received {
                    Ok(event) => {
                        let Some(request) = accept(&page, event) else {
                            continue;
                        };
                        let page = page.clone();
                        let relay = relay.clone();
                        tokio::spawn(async move { respond(&page, &relay, request).await });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        bookhub_warn!("dashboard bridge skipped {} page messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            bookhub_debug!("dashboard bridge listener released");
        }))
    }
}

impl Drop for DashboardBridge {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// A dashboard request from this very page, or `None`.
fn accept(page: &WeakPageWindow, event: PageEvent) -> Option<PageMessage> {
    if !page.is_own(&event) {
        return None;
    }
    let message: PageMessage = serde_json::from_value(event.data).ok()?;
    (message.source == DASHBOARD_SOURCE).then_some(message)
}

async fn respond(page: &WeakPageWindow, relay: &RelayClient, request: PageMessage) {
    match request.kind.as_str() {
        GET_SNAPSHOT => {
            let payload = match relay.get_snapshot().await {
                Ok(snapshot) => serde_json::to_value(snapshot).unwrap_or(Value::Null),
                Err(err) => {
                    bookhub_warn!("snapshot request failed: {}", err);
                    Value::Null
                }
            };
            post(page, SNAPSHOT, payload);
        }
        START_SYNC => {
            let response = relay
                .start_sync()
                .await
                .unwrap_or_else(|err| SurfaceResponse::failed(err.to_string()));
            let payload = serde_json::to_value(&response).unwrap_or(Value::Null);
            post(page, START_SYNC_RESULT, payload);
        }
        other => bookhub_debug!("ignoring dashboard message {:?}", other),
    }
}

fn post(page: &WeakPageWindow, kind: &str, payload: Value) {
    let Some(window) = page.upgrade() else {
        bookhub_debug!("page closed before the {} reply", kind);
        return;
    };
    match serde_json::to_value(PageMessage::from_extension(kind, payload)) {
        Ok(data) => window.post_message(data),
        Err(err) => bookhub_warn!("page reply not serializable: {}", err),
    }
}

/// Dashboard side of the page channel: posts requests, awaits bridge replies.
pub struct DashboardPage {
    window: PageWindow,
    events: broadcast::Receiver<PageEvent>,
}

impl DashboardPage {
    pub fn new(window: PageWindow) -> Self {
        let events = window.subscribe();
        Self { window, events }
    }

    pub fn request_snapshot(&self) {
        self.post(GET_SNAPSHOT);
    }

    pub fn request_start_sync(&self) {
        self.post(START_SYNC);
    }

    /// Requests the stored snapshot and waits for the reply.
    /// `None` when the page channel closes first.
    pub async fn fetch_snapshot(&mut self) -> Option<Option<Snapshot>> {
        self.request_snapshot();
        let payload = self.wait_for(SNAPSHOT).await?;
        Some(serde_json::from_value(payload).unwrap_or(None))
    }

    pub async fn start_sync(&mut self) -> Option<SurfaceResponse> {
        self.request_start_sync();
        let payload = self.wait_for(START_SYNC_RESULT).await?;
        serde_json::from_value(payload).ok()
    }

    /// Next extension reply of type `kind`; other traffic is skipped.
    pub async fn wait_for(&mut self, kind: &str) -> Option<Value> {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    let Ok(message) = serde_json::from_value::<PageMessage>(event.data) else {
                        continue;
                    };
                    if message.source == EXTENSION_SOURCE && message.kind == kind {
                        return Some(message.payload.unwrap_or(Value::Null));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn post(&self, kind: &str) {
        match serde_json::to_value(PageMessage::from_dashboard(kind)) {
            Ok(data) => self.window.post_message(data),
            Err(err) => bookhub_warn!("page request not serializable: {}", err),
        }
    }
}
