use std::{io, process::ExitStatus, time::Duration};

use foam_core::ExitOutcome;
use tokio::process::Child;
use tracing::{debug, trace};

/// Default time between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Map a process exit status onto the run's exit outcome.
pub fn exit_outcome(status: ExitStatus) -> ExitOutcome {
    if let Some(code) = status.code() {
        return ExitOutcome::exited(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return ExitOutcome::signaled(sig);
        }
    }

    ExitOutcome::lost("process ended without exit code or signal")
}

/// Send `sig` to the process group led by `pid`. A group that is already gone is not an error.
#[cfg(unix)]
pub fn signal_group(pid: u32, sig: libc::c_int) -> io::Result<()> {
    let pgid = i32::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;
    let rc = unsafe { libc::kill(-pgid, sig) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Terminate `child` and its process group: SIGTERM, wait up to `grace`, then SIGKILL.
///
/// The child must have been spawned as a group leader.
#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return child.wait().await;
    };

    trace!(target: "foam.exec.util", pid, "SIGTERM to process group");
    signal_group(pid, libc::SIGTERM)?;

    let status = match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            debug!(target: "foam.exec.util", pid, ?grace, "grace period elapsed; SIGKILL");
            signal_group(pid, libc::SIGKILL)?;
            child.wait().await?
        }
    };

    // Leftover group members would keep the output pipes open.
    signal_group(pid, libc::SIGKILL)?;
    Ok(status)
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> io::Result<ExitStatus> {
    child.kill().await?;
    child.wait().await
}
