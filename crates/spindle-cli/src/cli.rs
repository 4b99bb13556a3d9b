//! Command-line arguments and their mapping onto `EngineConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use spindle_core::app::BuildError;
use spindle_core::{Concurrency, Context, EngineConfig, EngineError, ErrorPolicy, OutputMode};
use thiserror::Error;

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(
    name = "spindle",
    version,
    about = "Run a command for every input line, a bounded number at a time"
)]
pub struct Cli {
    /// Concurrent commands; 0 or negative runs everything at once.
    #[arg(short = 'j', long = "jobs", allow_negative_numbers = true)]
    pub jobs: Option<i64>,

    /// Print results in input order.
    #[arg(long)]
    pub ordered: bool,

    /// Print nothing until every command has finished.
    #[arg(long)]
    pub collect: bool,

    /// Per-command timeout in milliseconds.
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Stop dispatching after the first failure.
    #[arg(long)]
    pub halt_on_error: bool,

    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,

    /// One JSON outcome per line on stdout.
    #[arg(long)]
    pub json: bool,

    /// JSON engine config; flags override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Shared value exported to every command as an environment variable.
    #[arg(long = "ctx", value_name = "KEY=VALUE", value_parser = parse_ctx)]
    pub ctx: Vec<(String, String)>,

    /// Read items from a file instead of stdin.
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Command to run; `{}` is replaced by the item.
    #[arg(last = true, required = true, value_name = "CMD")]
    pub command: Vec<String>,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no command given")]
    EmptyCommand,

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl Cli {
    /// Overlay the flags on `base`.
    pub fn to_config(&self, base: EngineConfig) -> EngineConfig {
        let mut config = base;
        if let Some(jobs) = self.jobs {
            config.concurrency = Concurrency::from_limit(jobs);
        }
        if self.ordered {
            config.ordered = true;
        }
        if self.collect {
            config.output = OutputMode::Collected;
        }
        if let Some(ms) = self.timeout_ms {
            config.task_timeout = Some(Duration::from_millis(ms));
        }
        if self.halt_on_error {
            config.error_policy = ErrorPolicy::HaltOnError;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = Some(capacity);
        }
        config
    }

    pub fn context(&self) -> Context {
        self.ctx
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_json_str(&text).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_ctx(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
