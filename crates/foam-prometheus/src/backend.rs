use std::time::Duration;

use foam_core::MetricsBackend;
use foam_model::{LaunchMode, RunState, StreamKind};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::warn;

/// Solver runs range from seconds to days.
const DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0, 4.0 * 3600.0, 12.0 * 3600.0, 86400.0,
];

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    runs_started: IntCounterVec,
    runs_completed: IntCounterVec,
    run_duration: HistogramVec,
    launch_errors: IntCounterVec,
    output_lines: IntCounterVec,
    subscribers: IntGauge,
}

impl PrometheusMetrics {
    /// Create the collectors in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create the collectors in `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let runs_started = IntCounterVec::new(
            Opts::new("foampanel_runs_started_total", "Runs whose process was spawned"),
            &["mode"],
        )?;
        let runs_completed = IntCounterVec::new(
            Opts::new("foampanel_runs_completed_total", "Runs that reached a terminal state"),
            &["mode", "outcome"],
        )?;
        let run_duration = HistogramVec::new(
            HistogramOpts::new("foampanel_run_duration_seconds", "Wall-clock run duration")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["mode"],
        )?;
        let launch_errors = IntCounterVec::new(
            Opts::new("foampanel_launch_errors_total", "Runs that failed to spawn"),
            &["mode"],
        )?;
        let output_lines = IntCounterVec::new(
            Opts::new("foampanel_output_lines_total", "Output lines published"),
            &["stream"],
        )?;
        let subscribers = IntGauge::new("foampanel_subscribers", "Connected push subscribers")?;

        registry.register(Box::new(runs_started.clone()))?;
        registry.register(Box::new(runs_completed.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;
        registry.register(Box::new(launch_errors.clone()))?;
        registry.register(Box::new(output_lines.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;

        Ok(Self {
            registry,
            runs_started,
            runs_completed,
            run_duration,
            launch_errors,
            output_lines,
            subscribers,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn run_started(&self, mode: LaunchMode) {
        self.runs_started.with_label_values(&[mode.as_str()]).inc();
    }

    fn run_finished(&self, mode: LaunchMode, state: RunState, duration: Duration) {
        self.runs_completed
            .with_label_values(&[mode.as_str(), state.as_str()])
            .inc();
        self.run_duration
            .with_label_values(&[mode.as_str()])
            .observe(duration.as_secs_f64());
    }

    fn launch_failed(&self, mode: LaunchMode) {
        self.launch_errors.with_label_values(&[mode.as_str()]).inc();
    }

    fn output_line(&self, stream: StreamKind) {
        self.output_lines
            .with_label_values(&[stream.as_str()])
            .inc();
    }

    fn subscribers(&self, count: usize) {
        self.subscribers
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    fn render(&self) -> Option<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&self.gather(), &mut buf) {
            warn!(target: "foam.prometheus", error = %e, "metrics encoding failed");
            return None;
        }
        String::from_utf8(buf).ok()
    }
}
