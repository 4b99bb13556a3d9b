//! Command executor: runs one external command per item.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use spindle_core::domain::{Context, Envelope};
use spindle_core::ports::TaskExecutor;
use spindle_core::{ExecutorUnavailable, TaskError};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const PLACEHOLDER: &str = "{}";
pub const INDEX_ENV: &str = "SPINDLE_INDEX";

/// `program args...`, where `{}` stands for the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// `None` for an empty command line.
    pub fn parse(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Substitute the item for every `{}`; append it when there is none.
    pub fn render(&self, item: &str) -> Vec<String> {
        if self.args.iter().any(|a| a.contains(PLACEHOLDER)) {
            self.args
                .iter()
                .map(|a| a.replace(PLACEHOLDER, item))
                .collect()
        } else {
            let mut args = self.args.clone();
            args.push(item.to_string());
            args
        }
    }
}

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub code: i32,
}

pub struct CommandExecutor {
    template: CommandTemplate,
}

impl CommandExecutor {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

#[async_trait]
impl TaskExecutor<String> for CommandExecutor {
    type Output = CommandOutput;

    async fn execute(
        &self,
        envelope: Envelope<String>,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, TaskError> {
        let mut command = Command::new(self.template.program());
        command
            .args(self.template.render(envelope.item()))
            .envs(context_env(envelope.context()))
            .env(INDEX_ENV, envelope.index().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| TaskError::failed(format!("failed to spawn {}: {e}", self.template.program())))?;
        debug!(index = envelope.index(), pid = child.id(), "command spawned");

        // child は future ごと drop されると kill される
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            output = child.wait_with_output() => output
                .map_err(|e| TaskError::failed(format!("failed to wait for command: {e}")))?,
        };

        if output.status.success() {
            return Ok(CommandOutput {
                stdout: trim_newline(&String::from_utf8_lossy(&output.stdout)).to_string(),
                code: 0,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        let status = match output.status.code() {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(TaskError::failed(if detail.is_empty() {
            status
        } else {
            format!("{status}: {detail}")
        }))
    }

    async fn probe(&self) -> Result<(), ExecutorUnavailable> {
        which::which(self.template.program())
            .map(|_| ())
            .map_err(|e| ExecutorUnavailable::new(format!("{}: {e}", self.template.program())))
    }
}

/// Context values as environment variables. Strings are exported as-is,
/// anything else as JSON text.
fn context_env(context: &Context) -> Vec<(String, String)> {
    context
        .iter()
        .map(|(name, value)| {
            let text = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            (name.to_string(), text)
        })
        .collect()
}

fn trim_newline(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}
