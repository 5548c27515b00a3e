use std::{
    io,
    path::Path,
    time::SystemTime,
};

use foam_model::{LAUNCH_FAILED_EXIT_CODE, RunInfo, RunState, to_epoch_secs};
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{debug, warn};

use crate::registry::LOG_FILE_NAME;

/// Name of the persisted run record inside every run directory.
pub const RECORD_FILE_NAME: &str = "run.json";

/// Diagnostic attached to runs found active after a restart.
pub const RESTART_DIAGNOSTIC: &str = "server restarted";

const RULE: &str = "================================================================================";

/// Append-only mirror of a run's output.
pub struct RunLog {
    file: BufWriter<File>,
}

impl RunLog {
    /// Create the log file and write the run header.
    pub async fn create(run: &RunInfo) -> io::Result<Self> {
        let file = File::create(&run.log_file).await?;
        let mut log = Self {
            file: BufWriter::new(file),
        };
        let header = format!(
            "Starting simulation at {}\nCommand: {}\nMode: {}\n{RULE}\n\n",
            format_time(run.start_time),
            run.command,
            run.mode,
        );
        log.file.write_all(header.as_bytes()).await?;
        log.file.flush().await?;
        Ok(log)
    }

    /// Append one line and flush, so readers of `/logs` see progress.
    pub async fn append(&mut self, text: &str) -> io::Result<()> {
        self.file.write_all(text.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.file.flush().await
    }
}

/// Append free text to a run log, creating the file if needed.
pub async fn append_note(path: &Path, text: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

/// Append the completion summary of a terminal run.
pub async fn append_footer(run: &RunInfo, exit_code: i32) -> io::Result<()> {
    let end = run.end_time.unwrap_or_else(SystemTime::now);
    let mut footer = format!(
        "\n{RULE}\nProcess {} with exit code: {exit_code}\nStart time: {}\nEnd time: {}\nDuration: {:.2} seconds\n",
        match run.state {
            RunState::Stopped => "stopped",
            _ => "completed",
        },
        format_time(run.start_time),
        format_time(end),
        run.duration().as_secs_f64(),
    );
    if let Some(err) = &run.error {
        footer.push_str(&format!("Error: {err}\n"));
    }
    append_note(&run.log_file, &footer).await
}

/// Persist `run` as `run.json` in its run directory (temp file + rename).
pub async fn write_record(run: &RunInfo) -> io::Result<()> {
    let body = serde_json::to_vec_pretty(run).map_err(io::Error::other)?;
    let path = run.run_dir.join(RECORD_FILE_NAME);
    let tmp = run.run_dir.join(format!("{RECORD_FILE_NAME}.tmp"));
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, &path).await
}

/// Read a persisted run record.
pub async fn read_record(run_dir: &Path) -> io::Result<RunInfo> {
    let body = fs::read(run_dir.join(RECORD_FILE_NAME)).await?;
    serde_json::from_slice(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Mark runs left active by a previous server process as failed.
///
/// Scans `runs_root` for run records in a non-terminal state, rewrites them
/// as `Failed` with [`RESTART_DIAGNOSTIC`] and returns the recovered runs.
pub async fn recover_orphans(runs_root: &Path) -> io::Result<Vec<RunInfo>> {
    let mut recovered = Vec::new();
    let mut entries = match fs::read_dir(runs_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(recovered),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let dir = entry.path();
        let mut run = match read_record(&dir).await {
            Ok(run) => run,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(target: "foam.core.runlog", dir = %dir.display(), error = %e, "unreadable run record");
                continue;
            }
        };
        if !run.state.is_active() {
            continue;
        }

        run.state = RunState::Failed;
        run.end_time = Some(SystemTime::now());
        run.exit_code = Some(LAUNCH_FAILED_EXIT_CODE);
        run.error = Some(RESTART_DIAGNOSTIC.to_string());
        // The record may point at a directory that moved; keep the one we found.
        let log_name = run
            .log_file
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| LOG_FILE_NAME.into());
        run.log_file = dir.join(log_name);
        run.run_dir = dir;

        write_record(&run).await?;
        if let Err(e) = append_footer(&run, LAUNCH_FAILED_EXIT_CODE).await {
            debug!(target: "foam.core.runlog", run_id = %run.run_id, error = %e, "footer not written");
        }
        recovered.push(run);
    }

    Ok(recovered)
}

/// RFC 3339 in the local offset, falling back to epoch seconds.
pub fn format_time(at: SystemTime) -> String {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::from(at)
        .to_offset(offset)
        .format(&Rfc3339)
        .unwrap_or_else(|_| format!("{:.3}", to_epoch_secs(at)))
}
