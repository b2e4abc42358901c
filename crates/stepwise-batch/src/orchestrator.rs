//! Step-by-step run of the whole scenario tree.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use stepwise_core::carry::{NEW_CAPACITY, OPERATIONAL_LIFE, REGION, RESIDUAL_CAPACITY, TECHNOLOGY};
use stepwise_core::{
    carry_forward, BranchId, BranchPath, CancelToken, Dataset, Decision, OperationalLife,
    ScenarioTree, Step, StepError, Table, YEAR,
};
use stepwise_io::read_table;
use stepwise_scenarios::{write_plan, PlanManifest, WorkspaceArena, WorkspaceLayout, WorkspaceMaterializer};
use tracing::{debug, error, info, warn};

use crate::manifest::{write_run_manifest, BranchRecord, RunManifest};
use crate::pipeline::{run_pipeline, Collaborators, Stage};
use crate::runner::BranchPool;
use crate::store::ResultStore;

pub struct OrchestratorConfig {
    pub layout: WorkspaceLayout,
    pub steps: Vec<Step>,
    /// `0` uses one worker per CPU.
    pub workers: usize,
    pub model_file: PathBuf,
    /// Prune failed branches and continue instead of stopping at the first
    /// failure.
    pub keep_going: bool,
    pub cancel: CancelToken,
}

/// Counts and locations reported once a run finishes.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub success: usize,
    pub failure: usize,
    pub pruned: usize,
    pub scenarios: Vec<String>,
    pub manifest_path: PathBuf,
}

pub struct Orchestrator<'a> {
    config: OrchestratorConfig,
    collaborators: Collaborators<'a>,
    reference: Dataset,
    decisions: Vec<Decision>,
}

struct RunState {
    tree: ScenarioTree,
    arena: WorkspaceArena,
    /// Capacity built so far by each branch of the last finished step.
    carried: HashMap<BranchId, Table>,
    store: ResultStore,
    records: Vec<BranchRecord>,
    success: usize,
    failure: usize,
    pruned: usize,
}

impl RunState {
    fn scenarios(&self) -> Vec<String> {
        if self.tree.num_steps() == 0 {
            return Vec::new();
        }
        self.tree
            .scenarios()
            .into_iter()
            .map(|id| self.tree.node(id).path.to_string())
            .collect()
    }
}

fn empty_residual() -> Table {
    Table::new(RESIDUAL_CAPACITY, [REGION, TECHNOLOGY, YEAR])
}

fn failed_record(step: usize, path: &BranchPath, reached: Stage, err: &StepError, elapsed_ms: u64) -> BranchRecord {
    BranchRecord {
        step,
        branch: path.to_string(),
        status: "failed".into(),
        stage: reached.as_str().into(),
        kind: Some(err.kind().into()),
        error: Some(err.to_string()),
        elapsed_ms,
    }
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: OrchestratorConfig,
        collaborators: Collaborators<'a>,
        reference: Dataset,
        decisions: Vec<Decision>,
    ) -> Self {
        Self {
            config,
            collaborators,
            reference,
            decisions,
        }
    }

    /// Run every step and write the run manifest, also when the run fails.
    pub fn run(&self) -> Result<RunSummary> {
        let created_at = Utc::now();
        let mut state = RunState {
            tree: ScenarioTree::default(),
            arena: WorkspaceArena::new(),
            carried: HashMap::new(),
            store: ResultStore::new(self.config.layout.clone()),
            records: Vec::new(),
            success: 0,
            failure: 0,
            pruned: 0,
        };
        let outcome = self.execute(&mut state);

        let scenarios = state.scenarios();
        let manifest = RunManifest {
            created_at,
            finished_at: Utc::now(),
            num_steps: self.config.steps.len(),
            scenarios: scenarios.clone(),
            success: state.success,
            failure: state.failure,
            pruned: state.pruned,
            error: outcome.as_ref().err().map(|e| format!("{e:#}")),
            branches: state.records,
        };
        let manifest_path = self.config.layout.run_manifest();
        write_run_manifest(&manifest_path, &manifest)?;

        if let Err(err) = outcome {
            error!(manifest = %manifest_path.display(), "run failed: {err:#}");
            return Err(err);
        }
        info!(
            success = state.success,
            failure = state.failure,
            pruned = state.pruned,
            scenarios = scenarios.len(),
            "run finished"
        );
        Ok(RunSummary {
            success: state.success,
            failure: state.failure,
            pruned: state.pruned,
            scenarios,
            manifest_path,
        })
    }

    /// **Algorithm:**
    /// 1. Build the scenario tree and write the plan manifest.
    /// 2. For each step: materialise every live branch from its parent's
    ///    workspace and carried capacity, then run all branch pipelines on
    ///    the pool. The pool drains before anything else happens.
    /// 3. Prune failed branches with their descendants and result entries.
    /// 4. For each successful branch, carry its new capacity forward and
    ///    merge its actual-year results into every scenario below it.
    /// 5. Persist the result store once the last step is done.
    fn execute(&self, state: &mut RunState) -> Result<()> {
        let layout = &self.config.layout;
        let steps = &self.config.steps;
        state.tree = ScenarioTree::build(steps.len(), &self.decisions)?;
        let plan = PlanManifest::from_tree(steps, &state.tree);
        write_plan(&layout.plan_manifest(), &plan)?;
        info!(steps = steps.len(), branches = plan.branch_count(), "planned run");

        let pool = BranchPool::new(self.config.workers)?;
        let materializer = WorkspaceMaterializer::new(layout, &self.reference, &self.decisions);

        for step in steps {
            if self.config.cancel.is_cancelled() {
                return Err(StepError::Cancelled.into());
            }
            info!(
                step = step.index,
                actual = ?step.actual_years,
                modelled = ?step.modelled_years,
                "starting step"
            );

            let mut workspaces = Vec::new();
            for id in state.tree.live_branches(step.index) {
                let node = state.tree.node(id).clone();
                let predecessor = node.parent.and_then(|p| state.arena.get(p));
                let carried = node.parent.and_then(|p| state.carried.get(&p));
                match materializer.materialize(&node, step, carried, predecessor) {
                    Ok(ws) => workspaces.push(ws),
                    Err(err) => {
                        if err.downcast_ref::<StepError>().is_some_and(|e| e.is_fatal()) {
                            return Err(err);
                        }
                        let failure = StepError::BuildFailure {
                            branch: node.path.to_string(),
                            message: format!("{err:#}"),
                        };
                        self.fail_branch(state, step.index, id, Stage::Pending, failure, 0)?;
                    }
                }
            }

            let collaborators = self.collaborators;
            let model = self.config.model_file.as_path();
            let cancel = &self.config.cancel;
            let outcomes = pool.run(&workspaces, |ws| run_pipeline(ws, collaborators, model, cancel));
            for ws in workspaces {
                state.arena.insert(ws);
            }
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled.into());
            }

            let mut solved = Vec::new();
            for outcome in outcomes {
                let elapsed_ms = u64::try_from(outcome.elapsed_ms).unwrap_or(u64::MAX);
                match outcome.result {
                    Ok(results) => {
                        state.success += 1;
                        state.records.push(BranchRecord {
                            step: step.index,
                            branch: state.tree.node(outcome.branch).path.to_string(),
                            status: "ok".into(),
                            stage: outcome.stage.as_str().into(),
                            kind: None,
                            error: None,
                            elapsed_ms,
                        });
                        solved.push((outcome.branch, results));
                    }
                    Err(err) => {
                        self.fail_branch(state, step.index, outcome.branch, outcome.reached, err, elapsed_ms)?
                    }
                }
            }
            if solved.is_empty() {
                return Err(StepError::AllBranchesFailed {
                    step: step.index,
                    reason: "no branch of the step produced results".into(),
                }
                .into());
            }

            let has_next = step.index + 1 < steps.len();
            for (id, results) in solved {
                if has_next {
                    self.carry(state, step, id, &results)?;
                }
                for leaf in state.tree.scenarios_under(id) {
                    let scenario = state.tree.node(leaf).path.clone();
                    state.store.merge(&scenario, &results, &step.actual_years)?;
                }
            }
            let tree = &state.tree;
            state.carried.retain(|id, _| tree.node(*id).step == step.index);
        }

        state.store.persist()?;
        Ok(())
    }

    /// Residual capacity to hand to the children of `id`.
    fn carry(&self, state: &mut RunState, step: &Step, id: BranchId, results: &Dataset) -> Result<()> {
        let node = state.tree.node(id);
        let prior = node
            .parent
            .and_then(|p| state.carried.get(&p))
            .cloned()
            .unwrap_or_else(empty_residual);

        let Some(built) = results.get(NEW_CAPACITY) else {
            debug!(branch = %node.path, "no new capacity in results");
            state.carried.insert(id, prior);
            return Ok(());
        };

        let life_file = state
            .arena
            .get(id)
            .map(|ws| ws.data_dir().join(format!("{OPERATIONAL_LIFE}.csv")))
            .filter(|path| path.exists());
        let life = match life_file {
            Some(path) => OperationalLife::from_table(&read_table(&path)?)?,
            None => {
                warn!(branch = %node.path, "no {OPERATIONAL_LIFE} table in branch input");
                OperationalLife::new()
            }
        };

        let next = carry_forward(&prior, &life, built, &step.actual_years)?;
        debug!(branch = %node.path, rows = next.len(), "carried capacity forward");
        state.carried.insert(id, next);
        Ok(())
    }

    /// Prune `id` and everything below it.
    ///
    /// Returns an error when the failure ends the run: the branch is the
    /// tree root, or `keep_going` is off.
    fn fail_branch(
        &self,
        state: &mut RunState,
        step: usize,
        id: BranchId,
        reached: Stage,
        err: StepError,
        elapsed_ms: u64,
    ) -> Result<()> {
        let path = state.tree.node(id).path.clone();
        let doomed: Vec<BranchPath> = state
            .tree
            .scenarios_under(id)
            .into_iter()
            .map(|leaf| state.tree.node(leaf).path.clone())
            .collect();
        let root = state.tree.is_root(id);
        let pruned = state.tree.mark_failed(id);

        state.arena.discard(id)?;
        for scenario in &doomed {
            state.store.remove(scenario)?;
        }
        state.failure += 1;
        state.records.push(failed_record(step, &path, reached, &err, elapsed_ms));
        for descendant in &pruned {
            let node = state.tree.node(*descendant);
            state.records.push(BranchRecord {
                step: node.step,
                branch: node.path.to_string(),
                status: "pruned".into(),
                stage: Stage::Pending.as_str().into(),
                kind: None,
                error: Some(format!("ancestor {path} failed")),
                elapsed_ms: 0,
            });
        }
        state.pruned += pruned.len();
        warn!(branch = %path, step, pruned = pruned.len(), kind = err.kind(), "pruned branch");

        if root {
            return Err(StepError::AllBranchesFailed {
                step,
                reason: err.to_string(),
            }
            .into());
        }
        if !self.config.keep_going {
            return Err(err.into());
        }
        Ok(())
    }
}
