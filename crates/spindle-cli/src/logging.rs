//! Logging setup.
//!
//! Logs always go to stderr; stdout carries results. The filter comes from
//! `SPINDLE_LOG` (EnvFilter syntax) and defaults to `warn`, so failures and
//! halts are visible without extra flags.

use clap::ValueEnum;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "SPINDLE_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid {LOG_ENV} directive: {0}")]
    Filter(String),

    #[error("failed to install log subscriber: {0}")]
    Init(String),
}

pub fn init_logging(format: LogFormat) -> Result<(), LoggingError> {
    let filter = build_env_filter(std::env::var(LOG_ENV).ok().as_deref())?;
    let registry = Registry::default().with(filter);

    let installed = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| LoggingError::Init(e.to_string()))
}

fn build_env_filter(directive: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match directive {
        Some(directive) if !directive.trim().is_empty() => {
            EnvFilter::try_new(directive).map_err(|e| LoggingError::Filter(e.to_string()))
        }
        _ => Ok(EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_directive_uses_default() {
        assert_eq!(build_env_filter(None).unwrap().to_string(), "warn");
        assert_eq!(build_env_filter(Some("  ")).unwrap().to_string(), "warn");
    }

    #[test]
    fn directive_is_parsed() {
        let filter = build_env_filter(Some("spindle_core=debug")).unwrap();
        assert_eq!(filter.to_string(), "spindle_core=debug");
    }

    #[test]
    fn bad_directive_is_rejected() {
        assert!(matches!(
            build_env_filter(Some("spindle_core=loud")),
            Err(LoggingError::Filter(_))
        ));
    }
}
