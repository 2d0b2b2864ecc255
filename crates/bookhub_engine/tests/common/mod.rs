#![allow(dead_code)]

use std::sync::{Mutex, Once};

use bookhub_core::{Record, SurfaceRecord, TabId, WindowId};
use bookhub_engine::{
    HarvestSource, SourceError, SourceErrorKind, SurfaceError, SurfaceHost,
};
use url::Url;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(bookhub_logging::initialize_for_tests);
}

pub fn book(identifier: &str, title: &str) -> Record {
    Record::new(title, Some(identifier.to_string()), None, None).expect("valid record")
}

pub fn books(prefix: &str, count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| book(&format!("{prefix}{i:04}"), &format!("Book {prefix} {i}")))
        .collect()
}

/// What one `reveal_more` does to the scripted page.
#[derive(Debug, Clone)]
pub enum Step {
    Show(Vec<Record>),
    Fail,
    /// Shows the batch, then the page detaches once it has been extracted.
    ShowThenDetach(Vec<Record>),
}

#[derive(Debug, Default)]
struct PageState {
    revealed: usize,
    visible: Vec<Record>,
    extent: f64,
    extracts: usize,
    scroll_resets: usize,
    detach_on_extract: bool,
    detached: bool,
}

/// A lazily rendered page driven by a fixed script. Steps past the end of
/// the script reveal nothing.
pub struct ScriptedSource {
    steps: Vec<Step>,
    state: Mutex<PageState>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            state: Mutex::new(PageState::default()),
        }
    }

    /// Already shows `initial` before any step.
    pub fn with_visible(self, initial: Vec<Record>) -> Self {
        self.state.lock().unwrap().visible = initial;
        self
    }

    /// Make a record appear outside of the script (a late render).
    pub fn push(&self, record: Record) {
        let mut state = self.state.lock().unwrap();
        state.visible.push(record);
        state.extent += 100.0;
    }

    pub fn reveals(&self) -> usize {
        self.state.lock().unwrap().revealed
    }

    pub fn extracts(&self) -> usize {
        self.state.lock().unwrap().extracts
    }

    pub fn scroll_resets(&self) -> usize {
        self.state.lock().unwrap().scroll_resets
    }
}

#[async_trait::async_trait]
impl HarvestSource for ScriptedSource {
    fn url(&self) -> String {
        "https://read.amazon.co.jp/kindle-library".to_string()
    }

    async fn extent(&self) -> Result<f64, SourceError> {
        let state = self.state.lock().unwrap();
        if state.detached {
            return Err(SourceError::new(SourceErrorKind::Interaction, "page detached"));
        }
        Ok(state.extent)
    }

    async fn reveal_more(&self) -> Result<(), SourceError> {
        let mut state = self.state.lock().unwrap();
        let index = state.revealed;
        state.revealed += 1;
        match self.steps.get(index) {
            Some(Step::Show(batch)) => {
                state.extent += 100.0 * batch.len() as f64;
                state.visible.extend(batch.iter().cloned());
                Ok(())
            }
            Some(Step::ShowThenDetach(batch)) => {
                state.extent += 100.0 * batch.len() as f64;
                state.visible.extend(batch.iter().cloned());
                state.detach_on_extract = true;
                Ok(())
            }
            Some(Step::Fail) => Err(SourceError::new(
                SourceErrorKind::Interaction,
                format!("page stopped responding at step {}", index + 1),
            )),
            None => Ok(()),
        }
    }

    async fn extract(&self) -> Result<Vec<Record>, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.extracts += 1;
        if state.detach_on_extract {
            state.detached = true;
        }
        Ok(state.visible.clone())
    }

    async fn scroll_to_start(&self) -> Result<(), SourceError> {
        self.state.lock().unwrap().scroll_resets += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Open(String),
    KeepAlive(TabId),
    CloseWindow(WindowId),
    CloseTab(TabId),
}

/// Surface host that hands out tab ids from 1 and records every call.
#[derive(Default)]
pub struct FakeHost {
    calls: Mutex<Vec<HostCall>>,
    next_tab: Mutex<TabId>,
    fail_open: bool,
    without_windows: bool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn windowless() -> Self {
        Self {
            without_windows: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn closes(&self) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, HostCall::CloseTab(_) | HostCall::CloseWindow(_)))
            .collect()
    }

    fn log(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl SurfaceHost for FakeHost {
    async fn open(&self, url: &Url) -> Result<SurfaceRecord, SurfaceError> {
        self.log(HostCall::Open(url.to_string()));
        if self.fail_open {
            return Err(SurfaceError::new("window limit reached"));
        }
        let mut next = self.next_tab.lock().unwrap();
        *next += 1;
        let tab_id = *next;
        Ok(SurfaceRecord {
            tab_id,
            window_id: (!self.without_windows).then_some(100 + tab_id),
        })
    }

    async fn close_window(&self, window_id: WindowId) -> Result<(), SurfaceError> {
        self.log(HostCall::CloseWindow(window_id));
        Ok(())
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), SurfaceError> {
        self.log(HostCall::CloseTab(tab_id));
        Ok(())
    }

    async fn keep_alive(&self, tab_id: TabId) -> Result<(), SurfaceError> {
        self.log(HostCall::KeepAlive(tab_id));
        Ok(())
    }
}
