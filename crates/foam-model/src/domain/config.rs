use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DOCKER_IMAGE: &str = "haldardhruv/ubuntu_noble_openfoam:v2412";
pub const DEFAULT_OPENFOAM_VERSION: &str = "2412";

/// Settings chosen through the panel and persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Last case directory set by the user. Empty means "unset".
    pub case_dir: String,
    pub docker_image: String,
    pub openfoam_version: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            case_dir: String::new(),
            docker_image: DEFAULT_DOCKER_IMAGE.to_string(),
            openfoam_version: DEFAULT_OPENFOAM_VERSION.to_string(),
        }
    }
}

impl PanelConfig {
    pub fn case_dir(&self) -> Option<PathBuf> {
        let trimmed = self.case_dir.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }
}
