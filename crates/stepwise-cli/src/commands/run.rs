use std::path::Path;
use std::thread;

use anyhow::Result;
use stepwise_batch::{Collaborators, Orchestrator, OrchestratorConfig};
use stepwise_cli::cli::RunArgs;
use stepwise_cli::config::RunSettings;
use stepwise_core::{CancelToken, StepError};
use stepwise_io::MathProgExchange;
use stepwise_solver::{check_tools, CommandSolver, GlpsolDeckBuilder, SolverError};
use tracing::{info, warn};

use crate::commands::plan::load_inputs;

fn tool_error(err: SolverError) -> StepError {
    StepError::config(err.to_string())
}

/// Cancel `cancel` on Ctrl-C so running solvers are killed.
fn watch_interrupt(cancel: CancelToken) {
    thread::spawn(move || {
        let Ok(runtime) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
            return;
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    });
}

pub fn handle(project: &Path, args: &RunArgs) -> Result<()> {
    let settings = RunSettings::resolve(project, args)?;
    let inputs = load_inputs(&settings.plan)?;

    if !settings.model_file.is_file() {
        return Err(StepError::config(format!(
            "model file '{}' does not exist",
            settings.model_file.display()
        ))
        .into());
    }
    check_tools(settings.solver).map_err(tool_error)?;
    let deck = GlpsolDeckBuilder::new(settings.timeout_secs).map_err(tool_error)?;
    let solver = CommandSolver::locate(settings.solver, settings.timeout_secs).map_err(tool_error)?;
    let exchange = MathProgExchange::new(settings.defaults.clone(), settings.schema.clone());
    info!(solver = %settings.solver, workers = settings.workers, "tools located");

    let layout = settings.plan.layout.clone();
    layout.setup()?;
    layout.reset_run()?;

    let cancel = CancelToken::new();
    watch_interrupt(cancel.clone());

    let config = OrchestratorConfig {
        layout,
        steps: inputs.steps,
        workers: settings.workers,
        model_file: settings.model_file.clone(),
        keep_going: settings.keep_going,
        cancel,
    };
    let collaborators = Collaborators {
        exchange: &exchange,
        deck: &deck,
        solver: &solver,
    };
    let summary = Orchestrator::new(config, collaborators, inputs.reference, inputs.decisions).run()?;

    println!(
        "stepwise run: {} ok, {} failed, {} pruned",
        summary.success, summary.failure, summary.pruned
    );
    println!("Scenarios ({}):", summary.scenarios.len());
    for scenario in &summary.scenarios {
        println!("  {scenario}");
    }
    println!("Manifest: {}", summary.manifest_path.display());
    Ok(())
}
