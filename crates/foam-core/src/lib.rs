pub mod broadcast;
pub use broadcast::{Broadcaster, Subscription};
pub mod config;
pub use config::{ConfigError, ConfigStore};
pub mod error;
pub use error::CoreError;
pub mod launcher;
pub use launcher::{ExitOutcome, LaunchError, LaunchHandle, LaunchRequest, Launcher};
pub mod lifecycle;
pub mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics, noop_metrics};
pub mod panel;
pub use panel::{ControlPanel, PanelSettings};
pub mod registry;
pub use registry::RunRegistry;
pub mod router;
pub use router::LauncherRouter;
pub mod runlog;
pub mod sink;
pub use sink::OutputSink;
pub mod system;
