use std::{
    fs, io,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use foam_model::PanelConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Persisted panel configuration.
///
/// Loaded once at startup and rewritten on every successful `set_*` call.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<PanelConfig>,
}

impl ConfigStore {
    /// Load from `path`. A missing or unreadable file yields the defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match fs::read(&path) {
            Ok(body) => match serde_json::from_slice::<PanelConfig>(&body) {
                Ok(cfg) => {
                    info!(target: "foam.core.config", path = %path.display(), "config loaded");
                    cfg
                }
                Err(e) => {
                    warn!(target: "foam.core.config", path = %path.display(), error = %e, "config unreadable; using defaults");
                    PanelConfig::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(target: "foam.core.config", path = %path.display(), "no config file; using defaults");
                PanelConfig::default()
            }
            Err(e) => {
                warn!(target: "foam.core.config", path = %path.display(), error = %e, "config unreadable; using defaults");
                PanelConfig::default()
            }
        };

        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn snapshot(&self) -> PanelConfig {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the case directory, stored as an absolute path.
    pub fn set_case_dir(&self, case_dir: &str) -> Result<PanelConfig, ConfigError> {
        let trimmed = case_dir.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "case_dir",
                reason: "no case directory provided".into(),
            });
        }
        let absolute = std::path::absolute(trimmed).map_err(|e| ConfigError::InvalidValue {
            field: "case_dir",
            reason: e.to_string(),
        })?;

        self.update(|cfg| cfg.case_dir = absolute.display().to_string())
    }

    /// Update the docker image and/or OpenFOAM version. `None` keeps the current value.
    pub fn set_docker(
        &self,
        image: Option<&str>,
        openfoam_version: Option<&str>,
    ) -> Result<PanelConfig, ConfigError> {
        let image = non_blank("docker_image", image)?;
        let version = non_blank("openfoam_version", openfoam_version)?;

        self.update(|cfg| {
            if let Some(image) = image {
                cfg.docker_image = image;
            }
            if let Some(version) = version {
                cfg.openfoam_version = version;
            }
        })
    }

    fn update(&self, apply: impl FnOnce(&mut PanelConfig)) -> Result<PanelConfig, ConfigError> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        apply(&mut next);
        self.persist(&next)?;
        *guard = next.clone();
        debug!(target: "foam.core.config", ?next, "config updated");
        Ok(next)
    }

    fn persist(&self, cfg: &PanelConfig) -> Result<(), ConfigError> {
        let write_err = |e: &dyn std::fmt::Display| ConfigError::Write {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| write_err(&e))?;
        }
        let body = serde_json::to_vec_pretty(cfg).map_err(|e| write_err(&e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| write_err(&e))?;
        fs::rename(&tmp, &self.path).map_err(|e| write_err(&e))
    }
}

fn non_blank(field: &'static str, value: Option<&str>) -> Result<Option<String>, ConfigError> {
    match value.map(str::trim) {
        None => Ok(None),
        Some("") => Err(ConfigError::InvalidValue {
            field,
            reason: "must not be empty".into(),
        }),
        Some(v) => Ok(Some(v.to_string())),
    }
}
