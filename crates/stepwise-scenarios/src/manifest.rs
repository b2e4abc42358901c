use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stepwise_core::{ScenarioTree, Step};

/// Planned branches of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPlan {
    pub index: usize,
    pub actual_years: Vec<i32>,
    pub modelled_years: Vec<i32>,
    pub branches: Vec<String>,
}

/// Steps and branch paths of a run, written before any branch is solved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanManifest {
    pub created_at: DateTime<Utc>,
    pub steps: Vec<StepPlan>,
    /// Final-step branch paths, i.e. the scenarios results are stored under.
    pub scenarios: Vec<String>,
}

impl PlanManifest {
    pub fn from_tree(steps: &[Step], tree: &ScenarioTree) -> Self {
        let steps = steps
            .iter()
            .map(|step| StepPlan {
                index: step.index,
                actual_years: step.actual_years.clone(),
                modelled_years: step.modelled_years.clone(),
                branches: tree
                    .level(step.index)
                    .iter()
                    .map(|id| tree.node(*id).path.to_string())
                    .collect(),
            })
            .collect();
        let scenarios = tree
            .scenarios()
            .iter()
            .map(|id| tree.node(*id).path.to_string())
            .collect();
        Self {
            created_at: Utc::now(),
            steps,
            scenarios,
        }
    }

    pub fn branch_count(&self) -> usize {
        self.steps.iter().map(|s| s.branches.len()).sum()
    }
}

pub fn write_plan(path: &Path, plan: &PlanManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating plan directory '{}'", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("creating plan manifest '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, plan)
        .with_context(|| format!("writing plan manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_plan(path: &Path) -> Result<PlanManifest> {
    let file = File::open(path)
        .with_context(|| format!("opening plan manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing plan manifest '{}'", path.display()))
}
