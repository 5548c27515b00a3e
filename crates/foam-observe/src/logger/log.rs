use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError};

/// Environment variable that overrides the configured level directive.
pub const LOG_ENV: &str = "FOAMPANEL_LOG";

/// Directives appended to every filter to keep HTTP plumbing quiet.
const QUIET_DEPS: &str = "hyper=warn,h2=warn,tower=warn";

pub(super) struct Logger;

impl Logger {
    pub fn text(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        let layer = fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339());
        install(tracing_subscriber::registry().with(filter_for(cfg)?).with(layer))
    }

    pub fn json(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        let layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339());
        install(tracing_subscriber::registry().with(filter_for(cfg)?).with(layer))
    }

    pub fn journald(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        journald(filter_for(cfg)?)
    }
}

/// `FOAMPANEL_LOG` when set, else the configured level.
fn filter_for(cfg: &LoggerConfig) -> Result<EnvFilter, LoggerError> {
    match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => parse_filter(&directive),
        _ => parse_filter(&cfg.level),
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(format!("{directive},{QUIET_DEPS}"))
        .map_err(|_| LoggerError::InvalidLogLevel(directive.to_string()))
}

fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn install<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|e| {
        let msg = e.to_string();
        if msg.contains("already") {
            LoggerError::AlreadyInitialized
        } else {
            LoggerError::InitializationFailed(msg)
        }
    })
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald(filter: EnvFilter) -> Result<(), LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("foampanel".to_string());
    install(tracing_subscriber::registry().with(filter).with(layer))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald(_filter: EnvFilter) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}
