use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `foam=debug,tower_http=warn`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    /// Build from the textual format and level, as given on the command line.
    pub fn from_parts(format: &str, level: &str) -> Result<Self, LoggerError> {
        let level = level.trim();
        if level.is_empty() {
            return Err(LoggerError::InvalidLogLevel(level.to_string()));
        }
        Ok(Self {
            format: format.parse()?,
            level: level.to_string(),
            ..Self::default()
        })
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}
