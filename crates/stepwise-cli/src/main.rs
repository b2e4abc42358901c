use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use stepwise_cli::cli::{Cli, Commands};
use stepwise_core::StepError;
use tracing::error;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::FmtSubscriber;

mod commands;

const LOG_FILE: &str = "stepwise.log";

/// `--log-file`, or `logs/stepwise.log` when the project has a `logs/` directory.
fn log_file(cli: &Cli) -> Option<PathBuf> {
    cli.log_file.clone().or_else(|| {
        let logs = cli.project.join("logs");
        logs.is_dir().then(|| logs.join(LOG_FILE))
    })
}

fn init_logging(cli: &Cli) -> Result<()> {
    let builder = FmtSubscriber::builder().with_max_level(cli.log_level);
    match log_file(cli) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file '{}'", path.display()))?;
            let subscriber = builder
                .with_ansi(false)
                .with_writer(std::io::stderr.and(Mutex::new(file)))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("setting default subscriber")?;
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("setting default subscriber")?;
        }
    }
    Ok(())
}

/// 2 for configuration errors, 3 when every branch failed, 130 when
/// interrupted, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<StepError>() {
        Some(StepError::Configuration(_)) => 2,
        Some(StepError::AllBranchesFailed { .. }) => 3,
        Some(StepError::Cancelled) => 130,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli) {
        eprintln!("stepwise: {err:#}");
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Commands::Setup => commands::setup::handle(&cli.project),
        Commands::Plan(args) => commands::plan::handle(&cli.project, args),
        Commands::Run(args) => commands::run::handle(&cli.project, args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
