use std::collections::BTreeMap;

use crate::{TabId, WindowId};

/// An auxiliary surface opened by the coordinator to run a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRecord {
    pub tab_id: TabId,
    pub window_id: Option<WindowId>,
}

/// Surfaces currently owned by the coordinator, keyed by tab id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LifecycleTable {
    surfaces: BTreeMap<TabId, SurfaceRecord>,
}

impl LifecycleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tab_id: TabId) -> Option<&SurfaceRecord> {
        self.surfaces.get(&tab_id)
    }

    pub fn is_tracked(&self, tab_id: TabId) -> bool {
        self.surfaces.contains_key(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn surfaces(&self) -> Vec<SurfaceRecord> {
        self.surfaces.values().copied().collect()
    }

    fn forget(&mut self, tab_id: TabId) -> Option<SurfaceRecord> {
        self.surfaces.remove(&tab_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleMsg {
    /// A surface was created for a sync session.
    SurfaceOpened(SurfaceRecord),
    /// The agent running in `tab_id` reported the end of its session.
    SyncFinished {
        tab_id: Option<TabId>,
        auto_close: Option<bool>,
    },
    /// The surface went away on its own (closed by the user, crashed).
    SurfaceRemoved { tab_id: TabId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEffect {
    CloseWindow(WindowId),
    CloseTab(TabId),
}

/// Pure update function: applies a lifecycle message and returns the surfaces to close.
///
/// Removal is idempotent, so `SyncFinished` and `SurfaceRemoved` may arrive in
/// either order (or twice) with the same end state.
pub fn update(mut table: LifecycleTable, msg: LifecycleMsg) -> (LifecycleTable, Vec<LifecycleEffect>) {
    let effects = match msg {
        LifecycleMsg::SurfaceOpened(record) => {
            table.surfaces.insert(record.tab_id, record);
            Vec::new()
        }
        LifecycleMsg::SyncFinished { tab_id, auto_close } => {
            let Some(tab_id) = tab_id else {
                return (table, Vec::new());
            };
            let tracked = table.forget(tab_id);
            // An explicit flag wins; otherwise only surfaces we opened are closed.
            let close = auto_close.unwrap_or(tracked.is_some());
            if !close {
                Vec::new()
            } else {
                match tracked.and_then(|record| record.window_id) {
                    Some(window_id) => vec![LifecycleEffect::CloseWindow(window_id)],
                    None => vec![LifecycleEffect::CloseTab(tab_id)],
                }
            }
        }
        LifecycleMsg::SurfaceRemoved { tab_id } => {
            table.forget(tab_id);
            Vec::new()
        }
    };

    (table, effects)
}
