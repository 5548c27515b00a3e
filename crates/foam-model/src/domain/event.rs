use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{OutputLine, RunId, RunInfo, RunState, epoch_secs};

/// Everything the push channel can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    Output(OutputLine),
    Completion(CompletionEvent),
    Connection(ConnectionEvent),
    /// The subscriber fell behind and `skipped` events were dropped for it.
    Lagged { skipped: u64 },
}

impl PushEvent {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::Output(_) => "output",
            PushEvent::Completion(_) => "simulation_complete",
            PushEvent::Connection(c) => c.kind.as_str(),
            PushEvent::Lagged { .. } => "lagged",
        }
    }
}

/// Published exactly once per run, after all of its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub run_id: RunId,
    pub state: RunState,
    pub exit_code: i32,
    /// Seconds.
    pub duration: f64,
    #[serde(with = "epoch_secs")]
    pub start_time: SystemTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionEvent {
    /// Build the summary of a run that reached a terminal state.
    pub fn from_run(run: &RunInfo, exit_code: i32) -> Self {
        Self {
            run_id: run.run_id.clone(),
            state: run.state,
            exit_code,
            duration: run.duration().as_secs_f64(),
            start_time: run.start_time,
            log_file: Some(run.log_file.display().to_string()),
            error: run.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Connected,
    Reconnected,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Connected => "connected",
            ConnectionKind::Reconnected => "reconnected",
        }
    }
}

/// Sent to a single subscriber when its push channel opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub kind: ConnectionKind,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_run: Option<RunId>,
    #[serde(with = "epoch_secs")]
    pub server_time: SystemTime,
}
