use std::{sync::Arc, time::Duration};

use foam_model::{LaunchMode, RunState, StreamKind};

/// Sink for run and push-channel metrics.
///
/// Every hook has an empty default so backends only implement what they export.
pub trait MetricsBackend: Send + Sync + 'static {
    fn run_started(&self, _mode: LaunchMode) {}

    fn run_finished(&self, _mode: LaunchMode, _state: RunState, _duration: Duration) {}

    fn launch_failed(&self, _mode: LaunchMode) {}

    fn output_line(&self, _stream: StreamKind) {}

    fn subscribers(&self, _count: usize) {}

    /// Text exposition of the collected metrics, if the backend has one.
    fn render(&self) -> Option<String> {
        None
    }
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

/// Backend that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {}

pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoopMetrics)
}
