//! Requests exchanged with the coordinator.
//!
//! Every message travels as `{ "type": ..., "payload": {...} }`. Responses
//! are not tagged; the requester knows which shape to expect.
use serde::{Deserialize, Serialize};

use crate::{EnrichedRecord, TabId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Request {
    #[serde(rename = "bookhub:enrich-record")]
    EnrichRecord(EnrichRequest),
    #[serde(rename = "bookhub:open-sync-surface")]
    OpenAuxiliarySurface(OpenSurfaceRequest),
    #[serde(rename = "bookhub:sync-finished")]
    SyncFinished(SyncFinished),
    #[serde(rename = "bookhub:get-snapshot")]
    GetSnapshot {},
    #[serde(rename = "bookhub:start-sync")]
    StartSync {},
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::EnrichRecord(_) => "EnrichRecord",
            Request::OpenAuxiliarySurface(_) => "OpenAuxiliarySurface",
            Request::SyncFinished(_) => "SyncFinished",
            Request::GetSnapshot {} => "GetSnapshot",
            Request::StartSync {} => "StartSync",
        }
    }
}

/// Identity of the context a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageSender {
    /// Surface the sender runs in, when it runs in one.
    pub tab_id: Option<TabId>,
}

impl MessageSender {
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn from_tab(tab_id: TabId) -> Self {
        Self {
            tab_id: Some(tab_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichResponse {
    pub record: EnrichedRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    /// Requested from the dashboard page.
    Web,
    /// Requested by an in-page agent.
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSurfaceRequest {
    pub trigger: SyncTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SurfaceResponse {
    pub fn opened(surface_id: TabId) -> Self {
        Self {
            ok: true,
            surface_id: Some(surface_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            surface_id: None,
            error: Some(error.into()),
        }
    }
}

/// Terminal notification sent by an agent when its sync session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFinished {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_close: Option<bool>,
}

impl SyncFinished {
    pub fn succeeded(total: usize) -> Self {
        Self {
            success: true,
            total: Some(total),
            error: None,
            auto_close: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            total: None,
            error: Some(error.into()),
            auto_close: None,
        }
    }

    pub fn with_auto_close(mut self, auto_close: Option<bool>) -> Self {
        self.auto_close = auto_close;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}
