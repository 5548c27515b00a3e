use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{RunId, epoch_secs};

/// Origin of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
    /// Lines produced by the panel itself rather than the process.
    Info,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
            StreamKind::Info => "info",
        }
    }
}

/// One line of process output, as pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLine {
    pub run_id: RunId,
    #[serde(with = "epoch_secs")]
    pub timestamp: SystemTime,
    #[serde(rename = "data")]
    pub text: String,
    pub stream: StreamKind,
}

impl OutputLine {
    pub fn new(run_id: RunId, stream: StreamKind, text: impl Into<String>) -> Self {
        Self {
            run_id,
            timestamp: SystemTime::now(),
            text: text.into(),
            stream,
        }
    }
}
