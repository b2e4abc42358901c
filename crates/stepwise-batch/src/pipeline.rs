//! Per-branch execution pipeline.
//!
//! ```text
//! Pending -> Built -> Solved -> Validated -> Collected
//!     \________\_________\__________\_______-> Failed
//! ```

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use stepwise_core::{BranchId, CancelToken, Dataset, StepError};
use stepwise_io::{read_dataset, read_status, write_dataset, DataExchange};
use stepwise_scenarios::Workspace;
use stepwise_solver::{DeckBuilder, Solver, SolverError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Built,
    Solved,
    Validated,
    Collected,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Built => "built",
            Stage::Solved => "solved",
            Stage::Validated => "validated",
            Stage::Collected => "collected",
            Stage::Failed => "failed",
        }
    }
}

/// External collaborators a branch calls out to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub exchange: &'a dyn DataExchange,
    pub deck: &'a dyn DeckBuilder,
    pub solver: &'a dyn Solver,
}

/// Result of running one branch through the pipeline.
#[derive(Debug)]
pub struct BranchOutcome {
    pub branch: BranchId,
    /// `Collected` on success, `Failed` otherwise.
    pub stage: Stage,
    /// Last stage completed before the outcome.
    pub reached: Stage,
    pub result: Result<Dataset, StepError>,
    pub elapsed_ms: u128,
}

fn solver_failure(branch: &Workspace, err: SolverError, build: bool) -> StepError {
    if err.is_cancelled() {
        return StepError::Cancelled;
    }
    let branch = branch.path.to_string();
    let message = err.to_string();
    if build {
        StepError::BuildFailure { branch, message }
    } else {
        StepError::InfeasibleOrUnsolved { branch, message }
    }
}

/// Drive one workspace through build, solve, validate and collect.
///
/// **Algorithm:**
/// 1. Build: read the workspace input, write the native data file, then
///    generate the solver deck from the model definition.
/// 2. Solve: run the solver on the deck.
/// 3. Validate: parse the solution's status marker; only optimal or feasible
///    solutions continue.
/// 4. Collect: convert the solution to result tables and write them into
///    the workspace's `results/` directory.
///
/// Any failure stops the pipeline; the outcome records the last stage
/// completed.
pub fn run_pipeline(
    workspace: &Workspace,
    collaborators: Collaborators<'_>,
    model: &Path,
    cancel: &CancelToken,
) -> BranchOutcome {
    let started = Instant::now();
    let mut reached = Stage::Pending;
    let result = advance(workspace, collaborators, model, cancel, &mut reached);
    let elapsed_ms = started.elapsed().as_millis();

    let stage = match &result {
        Ok(_) => {
            info!(branch = %workspace.path, step = workspace.step, elapsed_ms, "branch collected");
            Stage::Collected
        }
        Err(err) => {
            warn!(branch = %workspace.path, step = workspace.step, after = reached.as_str(), "branch failed: {err}");
            Stage::Failed
        }
    };
    BranchOutcome {
        branch: workspace.branch,
        stage,
        reached,
        result,
        elapsed_ms,
    }
}

fn advance(
    workspace: &Workspace,
    collaborators: Collaborators<'_>,
    model: &Path,
    cancel: &CancelToken,
    stage: &mut Stage,
) -> Result<Dataset, StepError> {
    let build_failure = |message: String| StepError::BuildFailure {
        branch: workspace.path.to_string(),
        message,
    };

    let input = read_dataset(&workspace.data_dir()).map_err(|e| build_failure(format!("{e:#}")))?;
    collaborators
        .exchange
        .to_model_form(&input, &workspace.data_file())
        .map_err(|e| build_failure(format!("{e:#}")))?;
    *stage = Stage::Built;
    debug!(branch = %workspace.path, "model form written");

    collaborators
        .deck
        .build_deck(
            &workspace.data_file(),
            model,
            &workspace.deck(),
            &workspace.build_log(),
            cancel,
        )
        .map_err(|e| solver_failure(workspace, e, true))?;
    let solution = collaborators
        .solver
        .solve(&workspace.deck(), &workspace.solve_log(), cancel)
        .map_err(|e| solver_failure(workspace, e, false))?;
    *stage = Stage::Solved;

    let status = read_status(&solution).map_err(|e| StepError::InfeasibleOrUnsolved {
        branch: workspace.path.to_string(),
        message: format!("{e:#}"),
    })?;
    if !status.is_acceptable() {
        return Err(StepError::InfeasibleOrUnsolved {
            branch: workspace.path.to_string(),
            message: format!("{} reported {status:?}", collaborators.solver.id()),
        });
    }
    *stage = Stage::Validated;

    let results = collaborators
        .exchange
        .to_tabular(&solution, Some(&workspace.data_file()))
        .and_then(|results| {
            write_dataset(&results, &workspace.results_dir())?;
            Ok(results)
        })
        .map_err(|e| StepError::Other(format!("collecting results of {}: {e:#}", workspace.path)))?;
    *stage = Stage::Collected;
    Ok(results)
}
