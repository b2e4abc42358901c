//! Project configuration (`stepwise.toml`) and its merge with CLI flags.
//!
//! Precedence: command-line flag, then config file, then built-in default.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stepwise_core::{StepError, StepLength};
use stepwise_io::{ParamDefaults, ResultSchema};
use stepwise_scenarios::WorkspaceLayout;
use stepwise_solver::SolverId;

use crate::cli::{HorizonArgs, RunArgs};

pub const CONFIG_FILE: &str = "stepwise.toml";
pub const DEFAULT_MODEL_FILE: &str = "osemosys.txt";

/// Contents of `stepwise.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub step_length: Vec<i64>,
    pub foresight: Option<usize>,
    pub solver: Option<String>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub model_file: Option<PathBuf>,
    pub input_data: Option<PathBuf>,
    pub decisions: Option<PathBuf>,
    pub keep_going: Option<bool>,
    /// Parameter defaults for the datafile writer.
    pub defaults: ParamDefaults,
    /// Extra result variable index columns.
    pub results: Option<ResultSchema>,
}

/// Load `path`, or the default config when it does not exist.
pub fn load_project_config(path: &Path) -> Result<ProjectConfig> {
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config '{}'", path.display()))?;
    let config = toml::from_str(&contents)
        .map_err(|e| StepError::config(format!("invalid config '{}': {e}", path.display())))?;
    Ok(config)
}

/// Settings needed to plan a run.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub layout: WorkspaceLayout,
    pub step_length: StepLength,
    pub foresight: Option<usize>,
    pub input_data: PathBuf,
    /// `None` when no decision source was configured and the default one is
    /// absent.
    pub decisions: Option<PathBuf>,
    pub config: ProjectConfig,
}

/// Settings needed to solve a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub plan: PlanSettings,
    pub solver: SolverId,
    pub workers: usize,
    pub timeout_secs: u64,
    pub model_file: PathBuf,
    pub keep_going: bool,
    pub defaults: ParamDefaults,
    pub schema: ResultSchema,
}

fn under(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

impl PlanSettings {
    pub fn resolve(project: &Path, args: &HorizonArgs) -> Result<Self> {
        let layout = WorkspaceLayout::new(project);
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| project.join(CONFIG_FILE));
        let config = load_project_config(&config_path)?;

        let sizes = if args.step_length.is_empty() {
            &config.step_length
        } else {
            &args.step_length
        };
        if sizes.is_empty() {
            return Err(StepError::config(
                "no step length given; pass --step-length or set step_length in stepwise.toml",
            )
            .into());
        }
        let step_length = StepLength::from_sizes(sizes)?;

        let input_data = args
            .input_data
            .clone()
            .or_else(|| config.input_data.clone())
            .map(|p| under(project, p))
            .unwrap_or_else(|| layout.data_dir());

        let decisions = match args.decisions.clone().or_else(|| config.decisions.clone()) {
            Some(path) => Some(under(project, path)),
            None => Some(layout.decisions_dir()).filter(|p| p.is_dir()),
        };

        Ok(Self {
            layout,
            step_length,
            foresight: args.foresight.or(config.foresight),
            input_data,
            decisions,
            config,
        })
    }
}

impl RunSettings {
    pub fn resolve(project: &Path, args: &RunArgs) -> Result<Self> {
        let plan = PlanSettings::resolve(project, &args.horizon)?;
        let config = &plan.config;

        let solver_name = args
            .solver
            .clone()
            .or_else(|| config.solver.clone())
            .unwrap_or_else(|| "cbc".to_string());
        let solver: SolverId = solver_name
            .parse()
            .map_err(|e| StepError::config(format!("{e}")))?;

        let model_file = args
            .model_file
            .clone()
            .or_else(|| config.model_file.clone())
            .map(|p| under(project, p))
            .unwrap_or_else(|| plan.layout.model_dir().join(DEFAULT_MODEL_FILE));

        let mut schema = ResultSchema::default();
        if let Some(extra) = &config.results {
            schema.extend(extra);
        }

        Ok(Self {
            solver,
            workers: args.workers.or(config.workers).unwrap_or(0),
            timeout_secs: args.timeout_secs.or(config.timeout_secs).unwrap_or(0),
            model_file,
            keep_going: args.keep_going.or(config.keep_going).unwrap_or(true),
            defaults: config.defaults.clone(),
            schema,
            plan,
        })
    }
}
