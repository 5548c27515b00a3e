use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use foam_core::PanelSettings;
use foam_exec::{DockerConfig, ProcConfig, ResourceLimits};
use foam_model::LaunchMode;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "foam-paneld",
    version,
    about = "Run OpenFOAM commands natively or in Docker and stream their output"
)]
pub struct Cli {
    /// Address the HTTP API listens on
    #[arg(long, env = "FOAMPANEL_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// Directory holding one subdirectory per run
    #[arg(long, env = "FOAMPANEL_RUNS_ROOT", default_value = "runs")]
    pub runs_root: PathBuf,

    /// Persisted panel configuration (case directory, docker image, OpenFOAM version)
    #[arg(long, env = "FOAMPANEL_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Seconds between SIGTERM and SIGKILL when stopping a run
    #[arg(long, env = "FOAMPANEL_GRACE_SECS", default_value_t = 5)]
    pub grace_secs: u64,

    /// Per-subscriber push queue length
    #[arg(long, env = "FOAMPANEL_QUEUE_CAPACITY", default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Finished runs kept in memory
    #[arg(long, env = "FOAMPANEL_HISTORY", default_value_t = 32)]
    pub history: usize,

    /// Launch mode when a request names none (docker|shell|direct)
    #[arg(long, env = "FOAMPANEL_DEFAULT_MODE", default_value = "docker")]
    pub default_mode: LaunchMode,

    /// Container runtime CLI
    #[arg(long, env = "FOAMPANEL_DOCKER", default_value = "docker")]
    pub docker: String,

    /// Memory cap for container runs in GiB (0 disables it)
    #[arg(long, env = "FOAMPANEL_DOCKER_MEMORY_GB", default_value_t = 4)]
    pub docker_memory_gb: u64,

    /// Run containers as the host uid:gid
    #[arg(long, env = "FOAMPANEL_DOCKER_MAP_USER")]
    pub docker_map_user: bool,

    /// Script sourced before shell-mode commands, e.g. an OpenFOAM etc/bashrc
    #[arg(long, env = "FOAMPANEL_SHELL_SOURCE")]
    pub shell_source: Option<PathBuf>,

    /// Log format (text|json|journald)
    #[arg(long, env = "FOAMPANEL_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level directive, e.g. `info` or `info,foam.exec=debug`
    #[arg(long, env = "FOAMPANEL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Do not collect Prometheus metrics
    #[arg(long, env = "FOAMPANEL_NO_METRICS")]
    pub no_metrics: bool,
}

impl Cli {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn panel_settings(&self) -> PanelSettings {
        PanelSettings {
            runs_root: self.runs_root.clone(),
            history: self.history,
            queue_capacity: self.queue_capacity,
            default_mode: self.default_mode,
            docker_program: self.docker.clone(),
            ..Default::default()
        }
    }

    pub fn proc_config(&self) -> ProcConfig {
        ProcConfig {
            grace: self.grace(),
            ..Default::default()
        }
    }

    pub fn docker_config(&self) -> DockerConfig {
        let memory_bytes = (self.docker_memory_gb > 0)
            .then(|| self.docker_memory_gb.saturating_mul(1024 * 1024 * 1024));
        DockerConfig {
            program: self.docker.clone(),
            grace: self.grace(),
            limits: ResourceLimits {
                memory_bytes,
                ..ResourceLimits::container_default()
            },
            map_user: self.docker_map_user,
        }
    }
}
