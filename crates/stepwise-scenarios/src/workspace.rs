//! Project and branch workspace layout.
//!
//! ```text
//! <root>/
//!   data/                 reference CSVs (YEAR.csv, ...)
//!   data/scenarios/       decision source, one directory per step
//!   logs/
//!   model/                model definition
//!   results/<path...>/    consolidated results per scenario ("base" without decisions)
//!   steps/step_<i>/<path...>/
//!     data/               branch input CSVs
//!     data.txt            native data file
//!     model.lp            solver deck
//!     model.sol           solution
//!     results/            step results
//!     logs/               build.log, solve.log
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stepwise_core::tree::BASE_SCENARIO;
use stepwise_core::{BranchId, BranchPath};
use tracing::{debug, info};

/// Directories created by `setup`.
pub const PROJECT_DIRS: [&str; 6] = ["data", "data/scenarios", "logs", "model", "results", "steps"];

const KEEP_FILE: &str = ".gitkeep";

/// Path arithmetic for a project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn decisions_dir(&self) -> PathBuf {
        self.root.join("data").join("scenarios")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join("model")
    }

    pub fn steps_dir(&self) -> PathBuf {
        self.root.join("steps")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn plan_manifest(&self) -> PathBuf {
        self.steps_dir().join("plan.json")
    }

    pub fn run_manifest(&self) -> PathBuf {
        self.results_dir().join("run_manifest.json")
    }

    /// Directory of the branch `path` at `step`.
    pub fn branch_dir(&self, step: usize, path: &BranchPath) -> PathBuf {
        let mut dir = self.steps_dir().join(format!("step_{step}"));
        if path.is_root() {
            dir.push(BASE_SCENARIO);
        }
        for segment in path.segments() {
            dir.push(segment);
        }
        dir
    }

    /// Consolidated result directory of a scenario.
    pub fn scenario_dir(&self, path: &BranchPath) -> PathBuf {
        let mut dir = self.results_dir();
        if path.is_root() {
            dir.push(BASE_SCENARIO);
        }
        for segment in path.segments() {
            dir.push(segment);
        }
        dir
    }

    /// Create the project directories. Existing content is kept.
    pub fn setup(&self) -> Result<()> {
        for dir in PROJECT_DIRS {
            let path = self.root.join(dir);
            fs::create_dir_all(&path).with_context(|| format!("creating {}", path.display()))?;
        }
        info!(root = %self.root.display(), "project layout ready");
        Ok(())
    }

    /// Clear branch workspaces and results of a previous run.
    pub fn reset_run(&self) -> Result<()> {
        for dir in [self.steps_dir(), self.results_dir()] {
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
            for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
                let path = entry?.path();
                if path.file_name().is_some_and(|n| n == KEEP_FILE) {
                    continue;
                }
                let removed = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                removed.with_context(|| format!("removing {}", path.display()))?;
            }
        }
        debug!(root = %self.root.display(), "cleared previous run");
        Ok(())
    }
}

/// Isolated input and output area for one branch at one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub branch: BranchId,
    pub step: usize,
    pub path: BranchPath,
    pub dir: PathBuf,
}

impl Workspace {
    pub fn data_dir(&self) -> PathBuf {
        self.dir.join("data")
    }

    pub fn data_file(&self) -> PathBuf {
        self.dir.join("data.txt")
    }

    pub fn deck(&self) -> PathBuf {
        self.dir.join("model.lp")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.join("results")
    }

    pub fn build_log(&self) -> PathBuf {
        self.dir.join("logs").join("build.log")
    }

    pub fn solve_log(&self) -> PathBuf {
        self.dir.join("logs").join("solve.log")
    }
}

/// Workspaces by branch.
#[derive(Debug, Default)]
pub struct WorkspaceArena {
    workspaces: HashMap<BranchId, Workspace>,
}

impl WorkspaceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, workspace: Workspace) {
        self.workspaces.insert(workspace.branch, workspace);
    }

    pub fn get(&self, id: BranchId) -> Option<&Workspace> {
        self.workspaces.get(&id)
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// Forget the workspace and delete its directory.
    pub fn discard(&mut self, id: BranchId) -> Result<Option<Workspace>> {
        let Some(workspace) = self.workspaces.remove(&id) else {
            return Ok(None);
        };
        if workspace.dir.exists() {
            fs::remove_dir_all(&workspace.dir)
                .with_context(|| format!("removing workspace {}", workspace.dir.display()))?;
        }
        debug!(branch = %workspace.path, step = workspace.step, "discarded workspace");
        Ok(Some(workspace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::{Decision, OptionId, ScenarioTree};
    use tempfile::tempdir;

    fn tree() -> ScenarioTree {
        let decision = Decision {
            name: "A".into(),
            step: 1,
            options: vec![OptionId::new("A", "0"), OptionId::new("A", "1")],
            rows: Vec::new(),
        };
        ScenarioTree::build(3, &[decision]).unwrap()
    }

    #[test]
    fn branch_dirs_nest_by_path() {
        let layout = WorkspaceLayout::new("/proj");
        let tree = tree();
        let root = tree.node(tree.level(0)[0]);
        assert_eq!(layout.branch_dir(0, &root.path), PathBuf::from("/proj/steps/step_0/base"));
        let a1 = tree.node(tree.level(2)[1]);
        assert_eq!(layout.branch_dir(2, &a1.path), PathBuf::from("/proj/steps/step_2/1A1"));
        assert_eq!(layout.scenario_dir(&a1.path), PathBuf::from("/proj/results/1A1"));
        assert_eq!(layout.scenario_dir(&root.path), PathBuf::from("/proj/results/base"));
    }

    #[test]
    fn setup_is_idempotent_and_reset_keeps_gitkeep() {
        let dir = tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        layout.setup().unwrap();
        layout.setup().unwrap();
        for sub in PROJECT_DIRS {
            assert!(dir.path().join(sub).is_dir());
        }

        fs::write(layout.steps_dir().join(KEEP_FILE), "").unwrap();
        fs::create_dir_all(layout.steps_dir().join("step_0/base")).unwrap();
        fs::write(layout.results_dir().join("old.csv"), "VALUE\n").unwrap();
        layout.reset_run().unwrap();
        assert!(layout.steps_dir().join(KEEP_FILE).exists());
        assert!(!layout.steps_dir().join("step_0").exists());
        assert!(!layout.results_dir().join("old.csv").exists());
    }

    #[test]
    fn discard_removes_directory() {
        let dir = tempdir().unwrap();
        let ws = Workspace {
            branch: BranchId(3),
            step: 1,
            path: BranchPath::root(),
            dir: dir.path().join("steps/step_1/base"),
        };
        fs::create_dir_all(ws.data_dir()).unwrap();
        let mut arena = WorkspaceArena::new();
        arena.insert(ws.clone());
        assert_eq!(arena.discard(BranchId(3)).unwrap(), Some(ws.clone()));
        assert!(!ws.dir.exists());
        assert!(arena.discard(BranchId(3)).unwrap().is_none());
    }
}
