//! Optimizer invocation.

use std::fs;
use std::path::Path;

use stepwise_core::CancelToken;
use stepwise_io::{solution_path, NativeSolution};
use tracing::info;

use crate::error::{SolverError, SolverResult};
use crate::subprocess::{find_binary, ToolProcess};
use crate::SolverId;

/// Solves a deck and returns the native solution it wrote.
pub trait Solver: Send + Sync {
    fn id(&self) -> SolverId;

    /// Solve `deck`, writing the solution next to it and tool output to `log`.
    fn solve(&self, deck: &Path, log: &Path, cancel: &CancelToken) -> SolverResult<NativeSolution>;
}

/// A solver run as an external command.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    id: SolverId,
    process: ToolProcess,
}

impl CommandSolver {
    /// Locate the solver binary and wrap it.
    pub fn locate(id: SolverId, timeout_seconds: u64) -> SolverResult<Self> {
        let binary = find_binary(id.binary_name())?;
        Ok(Self::with_binary(id, binary, timeout_seconds))
    }

    pub fn with_binary(id: SolverId, binary: impl Into<std::path::PathBuf>, timeout_seconds: u64) -> Self {
        Self {
            id,
            process: ToolProcess::new(binary, timeout_seconds),
        }
    }

    /// Command-line arguments for solving `deck` into `solution`.
    pub fn args(id: SolverId, deck: &Path, solution: &Path) -> Vec<String> {
        let deck = deck.display().to_string();
        let solution = solution.display().to_string();
        match id {
            SolverId::Cbc => vec![deck, "solve".into(), "-solu".into(), solution],
            SolverId::Glpk => vec!["--lp".into(), deck, "-o".into(), solution],
            SolverId::Gurobi => vec![format!("ResultFile={solution}"), deck],
            SolverId::Cplex => vec![
                "-c".into(),
                format!("read {deck}"),
                "optimize".into(),
                format!("write {solution}"),
            ],
        }
    }
}

impl Solver for CommandSolver {
    fn id(&self) -> SolverId {
        self.id
    }

    fn solve(&self, deck: &Path, log: &Path, cancel: &CancelToken) -> SolverResult<NativeSolution> {
        let dir = deck.parent().unwrap_or(Path::new("."));
        let solution = solution_path(dir);
        if solution.exists() {
            fs::remove_file(&solution)?;
        }
        self.process
            .run(&Self::args(self.id, deck, &solution), dir, log, cancel)?;
        if !solution.is_file() {
            return Err(SolverError::MissingSolution(solution));
        }
        info!(solver = %self.id, solution = %solution.display(), "solver finished");
        Ok(NativeSolution::new(solution, self.id.solution_format()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lines_per_solver() {
        let deck = Path::new("model.lp");
        let sol = Path::new("model.sol");
        assert_eq!(
            CommandSolver::args(SolverId::Cbc, deck, sol),
            vec!["model.lp", "solve", "-solu", "model.sol"]
        );
        assert_eq!(
            CommandSolver::args(SolverId::Glpk, deck, sol),
            vec!["--lp", "model.lp", "-o", "model.sol"]
        );
        assert_eq!(
            CommandSolver::args(SolverId::Gurobi, deck, sol),
            vec!["ResultFile=model.sol", "model.lp"]
        );
        assert_eq!(CommandSolver::args(SolverId::Cplex, deck, sol)[1], "read model.lp");
    }

    #[cfg(unix)]
    #[test]
    fn missing_solution_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("model.lp");
        fs::write(&deck, "").unwrap();
        // `true` accepts any arguments and writes nothing.
        let solver = CommandSolver::with_binary(SolverId::Cbc, "true", 5);
        let err = solver
            .solve(&deck, &dir.path().join("solve.log"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, SolverError::MissingSolution(_)));
    }
}
