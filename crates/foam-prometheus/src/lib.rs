//! Prometheus metrics backend for the OpenFOAM control panel.
//!
//! [`PrometheusMetrics`] implements [`foam_core::MetricsBackend`]; hand it to
//! the panel and serve [`PrometheusMetrics::render`] from `/metrics`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use foam_core::MetricsBackend;
//! use foam_model::LaunchMode;
//! use foam_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(PrometheusMetrics::new()?);
//! metrics.run_started(LaunchMode::Docker);
//! assert!(metrics.render().unwrap().contains("foampanel_runs_started_total"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `foampanel_runs_started_total{mode}` - Counter
//! - `foampanel_runs_completed_total{mode, outcome}` - Counter
//! - `foampanel_run_duration_seconds{mode}` - Histogram
//! - `foampanel_launch_errors_total{mode}` - Counter
//! - `foampanel_output_lines_total{stream}` - Counter
//! - `foampanel_subscribers` - Gauge

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
