use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Execution backend for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// `docker run` with the case directory mounted at `/case`.
    #[default]
    Docker,
    /// `sh -c` on the host.
    Shell,
    /// Program and arguments executed directly, no shell.
    Direct,
}

impl LaunchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchMode::Docker => "docker",
            LaunchMode::Shell => "shell",
            LaunchMode::Direct => "direct",
        }
    }
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("invalid launch mode: {0} (expected: docker|shell|direct)")]
pub struct ModeParseError(pub String);

impl FromStr for LaunchMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" | "container" => Ok(LaunchMode::Docker),
            "shell" | "sh" => Ok(LaunchMode::Shell),
            "direct" | "native" => Ok(LaunchMode::Direct),
            _ => Err(ModeParseError(s.to_string())),
        }
    }
}

/// Body of a start request.
///
/// Optional fields fall back to the persisted panel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSpec {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, alias = "caseDir", skip_serializing_if = "Option::is_none")]
    pub case_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LaunchMode>,
}

impl StartSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_case_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.case_dir = Some(dir.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}
