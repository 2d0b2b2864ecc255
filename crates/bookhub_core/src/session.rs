#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl SessionState {
    pub fn is_finished(self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }
}

/// Point-in-time view of a sync session, suitable for a status line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub state: SessionState,
    pub iteration: u32,
    pub idle_rounds: u32,
    pub total: usize,
    pub error: Option<String>,
}

impl SessionStatus {
    pub fn summary(&self) -> String {
        match self.state {
            SessionState::Idle => "idle".to_string(),
            SessionState::Running => format!(
                "syncing: iteration {} ({} records, {} idle)",
                self.iteration, self.total, self.idle_rounds
            ),
            SessionState::Succeeded => format!("sync complete: {} records", self.total),
            SessionState::Failed => format!(
                "sync failed after {} iterations: {}",
                self.iteration,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
