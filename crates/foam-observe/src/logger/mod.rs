mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;
pub use log::LOG_ENV;

/// Install the global tracing subscriber described by `cfg`.
///
/// Fails with [`LoggerError::AlreadyInitialized`] on a second call.
/// The level directive is taken from `FOAMPANEL_LOG` when that is set.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let install = match cfg.format {
        LoggerFormat::Text => log::Logger::text,
        LoggerFormat::Json => log::Logger::json,
        LoggerFormat::Journald => log::Logger::journald,
    };
    install(cfg)?;
    tracing::debug!(target: "foam.observe", format = cfg.format.as_str(), level = %cfg.level, "logger installed");
    Ok(())
}
