use std::{
    io,
    path::{Component, Path, PathBuf},
    process::Stdio,
    sync::OnceLock,
    time::{Duration, Instant},
};

use tokio::process::Command;
use tracing::{debug, trace};
use walkdir::WalkDir;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Record the server start time.
pub fn init_uptime() {
    START_TIME.get_or_init(Instant::now);
}

/// Server uptime in seconds.
pub fn uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_secs()
}

#[inline]
pub fn platform() -> &'static str {
    std::env::consts::OS
}

#[inline]
pub fn arch() -> &'static str {
    std::env::consts::ARCH
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
#[cfg(unix)]
pub fn available_space(path: &Path) -> io::Result<u64> {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "disk space query is only supported on unix",
    ))
}

/// Bytes to gigabytes, rounded to two decimals.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    let gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    (gb * 100.0).round() / 100.0
}

/// Whether the container runtime answers `<program> info` with success within `timeout`.
pub async fn docker_available(program: &str, timeout: Duration) -> bool {
    let child = Command::new(program)
        .arg("info")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!(target: "foam.core.system", program, error = %e, "docker check failed to spawn");
            false
        }
        Err(_) => {
            debug!(target: "foam.core.system", program, ?timeout, "docker check timed out");
            false
        }
    }
}

/// Whether `dir` looks like an OpenFOAM case.
pub fn is_case_dir(dir: &Path) -> bool {
    dir.join("system").is_dir() && dir.join("constant").is_dir()
}

/// Case directories under `root`, as sorted paths relative to it.
///
/// A case's own subdirectories are not searched.
pub fn discover_cases(root: &Path) -> io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("case root not found: {}", root.display()),
        ));
    }

    let mut cases = Vec::new();
    let mut walker = WalkDir::new(root).follow_links(false).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!(target: "foam.core.system", error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() || !is_case_dir(entry.path()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            cases.push(rel.to_path_buf());
        }
        walker.skip_current_dir();
    }

    cases.sort();
    Ok(cases)
}

/// Resolve a requested log path, refusing anything outside `runs_root`.
///
/// Relative paths are taken relative to `runs_root`. A path outside the root
/// is refused before the file system is consulted, so the answer does not
/// depend on whether it exists.
pub fn resolve_log_path(runs_root: &Path, requested: &str) -> io::Result<PathBuf> {
    let requested = Path::new(requested);
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        runs_root.join(requested)
    };

    let root = runs_root.canonicalize()?;
    let candidate = lexical_normalize(&std::path::absolute(&candidate)?);
    let lexical_root = lexical_normalize(&std::path::absolute(runs_root)?);
    if !candidate.starts_with(&lexical_root) && !candidate.starts_with(&root) {
        return Err(outside_runs_root());
    }

    // Symlinks inside the root may still point elsewhere.
    let resolved = candidate.canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(outside_runs_root());
    }
    if !resolved.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "not a file"));
    }
    Ok(resolved)
}

fn outside_runs_root() -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        "log path is outside the runs directory",
    )
}

/// Drop `.` and fold `..` without touching the file system.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
