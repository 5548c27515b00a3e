//! Resource limits for launched runs.
//!
//! Native runs (shell/direct) get POSIX rlimits installed in a `pre_exec`
//! hook, so the solver never runs unrestricted. Docker runs translate the same
//! limits into `docker run` flags, since rlimits on the CLI client would not
//! reach the container.
use tokio::process::Command;

/// Declarative limits for one run. `None` leaves the inherited limit unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Address-space cap for native runs (`RLIMIT_AS`), memory cap for containers.
    pub memory_bytes: Option<u64>,

    /// Maximum number of open file descriptors (`RLIMIT_NOFILE`).
    pub max_open_files: Option<u64>,

    /// Disable core dumps (`RLIMIT_CORE = 0`).
    pub disable_core_dumps: bool,
}

impl ResourceLimits {
    /// Container runs by default: 4 GiB memory cap, no core dumps.
    pub fn container_default() -> Self {
        Self {
            memory_bytes: Some(4 * 1024 * 1024 * 1024),
            disable_core_dumps: true,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.memory_bytes.is_none() && self.max_open_files.is_none() && !self.disable_core_dumps
    }

    /// `docker run` flags expressing these limits.
    pub fn docker_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(bytes) = self.memory_bytes {
            // Swap equal to memory: no swap beyond the cap.
            args.push(format!("--memory={bytes}"));
            args.push(format!("--memory-swap={bytes}"));
        }
        if let Some(nofile) = self.max_open_files {
            args.push(format!("--ulimit=nofile={nofile}:{nofile}"));
        }
        if self.disable_core_dumps {
            args.push("--ulimit=core=0:0".to_string());
        }
        args
    }
}

/// Install the limits on a native command.
///
/// On non-Unix targets the request is logged and ignored.
pub fn attach_rlimits(cmd: &mut Command, limits: &ResourceLimits) {
    if limits.is_empty() {
        return;
    }

    #[cfg(unix)]
    {
        unix_impl::attach_rlimits(cmd, limits);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
        tracing::warn!(
            target: "foam.exec.limits",
            ?limits,
            "rlimits requested on a non-Unix OS; ignored"
        );
    }
}

#[cfg(unix)]
mod unix_impl {
    use super::ResourceLimits;

    use std::io;

    use tokio::process::Command;

    cfg_if::cfg_if! {
        if #[cfg(all(target_os = "linux", target_env = "gnu"))] {
            type Resource = libc::__rlimit_resource_t;
        } else {
            type Resource = libc::c_int;
        }
    }

    pub fn attach_rlimits(cmd: &mut Command, limits: &ResourceLimits) {
        let memory = limits.memory_bytes;
        let nofile = limits.max_open_files;
        let no_core = limits.disable_core_dumps;

        // SAFETY: the hook only calls async-signal-safe setrlimit.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(bytes) = memory {
                    apply_rlimit(libc::RLIMIT_AS, bytes)?;
                }
                if let Some(n) = nofile {
                    apply_rlimit(libc::RLIMIT_NOFILE, n)?;
                }
                if no_core {
                    apply_rlimit(libc::RLIMIT_CORE, 0)?;
                }
                Ok(())
            });
        }
    }

    fn apply_rlimit(resource: Resource, value: u64) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };
        let rc = unsafe { libc::setrlimit(resource, &rlim) };
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}
