mod cli;
mod command;
mod logging;

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use spindle_core::domain::Outcome;
use spindle_core::impls::LineSource;
use spindle_core::ports::ItemSource;
use spindle_core::{Engine, EngineBuilder, RunReport, TerminationStatus};
use tokio::io::BufReader;
use tracing::error;

use crate::cli::{Cli, CliError};
use crate::command::{CommandExecutor, CommandOutput, CommandTemplate};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init_logging(cli.log_format) {
        eprintln!("spindle: {err}");
        return ExitCode::from(2);
    }

    match run(cli).await {
        Ok(status) => ExitCode::from(exit_code(status)),
        Err(err) => {
            error!(error = %err, "spindle failed");
            eprintln!("spindle: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<TerminationStatus, CliError> {
    let config = cli.to_config(cli::load_config(cli.config.as_deref())?);
    let engine = EngineBuilder::from_config(config)
        .context(cli.context())
        .build()?;
    let template = CommandTemplate::parse(&cli.command).ok_or(CliError::EmptyCommand)?;
    let executor = CommandExecutor::new(template);

    let report = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|source| CliError::Io {
                    path: path.clone(),
                    source,
                })?;
            drive(&engine, LineSource::new(BufReader::new(file)), executor, cli.json).await?
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            drive(&engine, LineSource::new(stdin), executor, cli.json).await?
        }
    };
    Ok(report.status)
}

async fn drive<S>(
    engine: &Engine,
    source: S,
    executor: CommandExecutor,
    json: bool,
) -> Result<RunReport, CliError>
where
    S: ItemSource<Item = String> + 'static,
{
    let mut run = engine.start(source, executor).await?;
    let ctrl_c = run.controller().trip_on_ctrl_c();

    let stdout = std::io::stdout();
    while let Some(outcome) = run.next().await {
        print_outcome(&mut stdout.lock(), &outcome, json)?;
    }
    ctrl_c.abort();

    let report = run.wait().await?;
    if !report.is_success() {
        eprintln!("spindle: {report}");
    }
    Ok(report)
}

/// Successful stdout goes to stdout; failures are already logged on stderr.
fn print_outcome(
    out: &mut impl Write,
    outcome: &Outcome<CommandOutput>,
    json: bool,
) -> Result<(), CliError> {
    if json {
        let line = serde_json::to_string(outcome)
            .map_err(|e| CliError::Output(std::io::Error::other(e)))?;
        writeln!(out, "{line}")?;
    } else if let Some(output) = outcome.value() {
        if !output.stdout.is_empty() {
            writeln!(out, "{}", output.stdout)?;
        }
    }
    Ok(())
}

fn exit_code(status: TerminationStatus) -> u8 {
    match status {
        TerminationStatus::Completed => 0,
        TerminationStatus::CompletedWithFailures => 1,
        TerminationStatus::Halted => 2,
        TerminationStatus::Cancelled => 130,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spindle_core::TaskFailure;
    use std::time::Duration;

    fn outcome(result: Result<CommandOutput, TaskFailure>) -> Outcome<CommandOutput> {
        Outcome {
            index: 3,
            worker: 1,
            started_at: Utc::now(),
            duration: Duration::from_millis(7),
            result,
        }
    }

    fn printed(outcome: &Outcome<CommandOutput>, json: bool) -> String {
        let mut buf = Vec::new();
        print_outcome(&mut buf, outcome, json).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn plain_mode_prints_only_successful_stdout() {
        let ok = outcome(Ok(CommandOutput {
            stdout: "hello".into(),
            code: 0,
        }));
        let failed = outcome(Err(TaskFailure::Failed {
            reason: "exit status 1".into(),
        }));
        assert_eq!(printed(&ok, false), "hello\n");
        assert_eq!(printed(&failed, false), "");
    }

    #[test]
    fn json_mode_prints_one_line_per_outcome() {
        let failed = outcome(Err(TaskFailure::Timeout {
            after: Duration::from_millis(50),
        }));
        let line = printed(&failed, true);
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["index"], 3);
        assert_eq!(value["duration_ms"], 7);
        assert_eq!(value["result"]["Err"]["kind"], "TIMEOUT");
        assert_eq!(value["result"]["Err"]["after_ms"], 50);
    }

    #[test]
    fn exit_codes_follow_status() {
        assert_eq!(exit_code(TerminationStatus::Completed), 0);
        assert_eq!(exit_code(TerminationStatus::CompletedWithFailures), 1);
        assert_eq!(exit_code(TerminationStatus::Halted), 2);
        assert_eq!(exit_code(TerminationStatus::Cancelled), 130);
    }
}
