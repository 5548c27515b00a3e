use foam_model::{OutputLine, PushEvent, RunId, StreamKind};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::{
    broadcast::Broadcaster,
    metrics::{MetricsHandle, noop_metrics},
    runlog::RunLog,
};

/// Where a launcher sends the lines it reads.
///
/// Stamps each line with the run id and time, publishes it and mirrors it to
/// the run log. Once the run's stop token is cancelled further lines are
/// dropped, so nothing is published after a stop request.
pub struct OutputSink {
    run_id: RunId,
    broadcaster: Broadcaster,
    stop: CancellationToken,
    log: Option<RunLog>,
    metrics: MetricsHandle,
    published: u64,
}

impl OutputSink {
    pub fn new(run_id: RunId, broadcaster: Broadcaster, stop: CancellationToken) -> Self {
        Self {
            run_id,
            broadcaster,
            stop,
            log: None,
            metrics: noop_metrics(),
            published: 0,
        }
    }

    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Publish one line. Returns `false` if it was dropped because the run is stopping.
    ///
    /// The stop check and the publish happen with no await in between; the
    /// log write follows, so a stop landing during it cannot let a line out.
    pub async fn emit(&mut self, stream: StreamKind, text: String) -> bool {
        if self.stop.is_cancelled() {
            trace!(target: "foam.core.sink", run_id = %self.run_id, "line dropped after stop");
            return false;
        }
        let line = OutputLine::new(self.run_id.clone(), stream, text);
        let text = self.log.is_some().then(|| line.text.clone());

        self.broadcaster.publish(PushEvent::Output(line));
        self.metrics.output_line(stream);
        self.published += 1;

        let (Some(log), Some(text)) = (self.log.as_mut(), text) else {
            return true;
        };
        if let Err(e) = log.append(&text).await {
            warn!(target: "foam.core.sink", run_id = %self.run_id, error = %e, "log write failed; disabling run log");
            self.log = None;
        }
        true
    }

    /// Flush the run log. Called by the launcher once the process is reaped.
    pub async fn finish(mut self) -> u64 {
        if let Some(log) = &mut self.log
            && let Err(e) = log.flush().await
        {
            warn!(target: "foam.core.sink", run_id = %self.run_id, error = %e, "log flush failed");
        }
        self.published
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_until_stopped() {
        let broadcaster = Broadcaster::new(16);
        let mut sub = broadcaster.subscribe();
        let stop = CancellationToken::new();
        let mut sink = OutputSink::new(RunId::from("r1"), broadcaster, stop.clone());

        assert!(sink.emit(StreamKind::Stdout, "A".into()).await);
        stop.cancel();
        assert!(!sink.emit(StreamKind::Stdout, "B".into()).await);
        assert_eq!(sink.finish().await, 1);

        match sub.recv().await.unwrap() {
            PushEvent::Output(line) => {
                assert_eq!(line.text, "A");
                assert_eq!(line.run_id, RunId::from("r1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn stopped_sink_neither_publishes_nor_logs() {
        use foam_model::{LaunchMode, RunInfo, RunState};
        use std::time::SystemTime;

        let dir = tempfile::tempdir().unwrap();
        let run = RunInfo {
            run_id: RunId::from("r2"),
            state: RunState::Running,
            command: "icoFoam".into(),
            mode: LaunchMode::Shell,
            log_file: dir.path().join("simulation.log"),
            run_dir: dir.path().to_path_buf(),
            start_time: SystemTime::now(),
            end_time: None,
            exit_code: None,
            error: None,
            stop_requested: false,
        };

        let broadcaster = Broadcaster::new(16);
        let mut sub = broadcaster.subscribe();
        let stop = CancellationToken::new();
        let log = RunLog::create(&run).await.unwrap();
        let mut sink = OutputSink::new(run.run_id.clone(), broadcaster.clone(), stop.clone())
            .with_log(log);

        assert!(sink.emit(StreamKind::Stdout, "Time = 1".into()).await);
        stop.cancel();
        assert!(!sink.emit(StreamKind::Stdout, "Time = 2".into()).await);
        assert_eq!(sink.finish().await, 1);

        let text = std::fs::read_to_string(&run.log_file).unwrap();
        assert!(text.contains("Time = 1\n"));
        assert!(!text.contains("Time = 2"));

        match sub.recv().await.unwrap() {
            PushEvent::Output(line) => assert_eq!(line.text, "Time = 1"),
            other => panic!("unexpected {other:?}"),
        }
        broadcaster.publish(PushEvent::Lagged { skipped: 0 });
        assert!(matches!(sub.recv().await.unwrap(), PushEvent::Lagged { .. }));
    }
}
