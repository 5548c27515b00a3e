use foam_model::{CompletionEvent, LAUNCH_FAILED_EXIT_CODE, PushEvent, RunInfo, RunState};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    broadcast::Broadcaster,
    error::CoreError,
    launcher::ExitOutcome,
    metrics::MetricsHandle,
    registry::RunRegistry,
    runlog,
};

/// Turns process exits into terminal run states and completion events.
#[derive(Clone)]
pub struct Notifier {
    registry: RunRegistry,
    broadcaster: Broadcaster,
    metrics: MetricsHandle,
}

impl Notifier {
    pub fn new(registry: RunRegistry, broadcaster: Broadcaster, metrics: MetricsHandle) -> Self {
        Self {
            registry,
            broadcaster,
            metrics,
        }
    }

    /// Wait for `exit` on a new task and finish the run when it resolves.
    ///
    /// The exit handle resolves only after the launcher emitted every output
    /// line, so the completion event is always published last.
    pub fn watch(&self, run: RunInfo, exit: JoinHandle<ExitOutcome>) -> JoinHandle<Option<RunInfo>> {
        let notifier = self.clone();
        tokio::spawn(async move {
            let outcome = match exit.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(target: "foam.core.lifecycle", run_id = %run.run_id, error = %e, "supervisor task failed");
                    ExitOutcome::lost(format!("supervisor task failed: {e}"))
                }
            };
            match notifier.finish(&run, outcome).await {
                Ok(done) => Some(done),
                Err(e) => {
                    error!(target: "foam.core.lifecycle", run_id = %run.run_id, error = %e, "failed to finish run");
                    None
                }
            }
        })
    }

    /// Move a Running run to its terminal state and announce it.
    pub async fn finish(&self, run: &RunInfo, outcome: ExitOutcome) -> Result<RunInfo, CoreError> {
        let stop_requested = self
            .registry
            .get(&run.run_id)
            .map(|r| r.stop_requested)
            .unwrap_or(run.stop_requested);

        let exit_code = outcome.exit_code();
        let state = if stop_requested {
            RunState::Stopped
        } else if outcome.success() {
            RunState::Completed
        } else {
            RunState::Failed
        };

        let done = self
            .registry
            .transition(&run.run_id, state, Some(exit_code), outcome.error)?;

        self.settle(&done, exit_code).await;
        info!(
            target: "foam.core.lifecycle",
            run_id = %done.run_id,
            state = %done.state,
            exit_code,
            duration_secs = done.duration().as_secs_f64(),
            "run finished"
        );
        Ok(done)
    }

    /// Fail a run whose process never started.
    pub async fn fail_launch(&self, run: &RunInfo, reason: String) -> Result<RunInfo, CoreError> {
        let done = self.registry.transition(
            &run.run_id,
            RunState::Failed,
            Some(LAUNCH_FAILED_EXIT_CODE),
            Some(reason.clone()),
        )?;

        if let Err(e) = runlog::append_note(&done.log_file, &format!("Error: {reason}\n")).await {
            debug!(target: "foam.core.lifecycle", run_id = %done.run_id, error = %e, "launch error not logged");
        }
        self.metrics.launch_failed(done.mode);
        self.settle(&done, LAUNCH_FAILED_EXIT_CODE).await;
        warn!(target: "foam.core.lifecycle", run_id = %done.run_id, %reason, "launch failed");
        Ok(done)
    }

    async fn settle(&self, done: &RunInfo, exit_code: i32) {
        if let Err(e) = runlog::append_footer(done, exit_code).await {
            warn!(target: "foam.core.lifecycle", run_id = %done.run_id, error = %e, "log footer not written");
        }
        if let Err(e) = runlog::write_record(done).await {
            warn!(target: "foam.core.lifecycle", run_id = %done.run_id, error = %e, "run record not written");
        }
        self.metrics
            .run_finished(done.mode, done.state, done.duration());
        self.broadcaster
            .publish(PushEvent::Completion(CompletionEvent::from_run(done, exit_code)));
    }
}
