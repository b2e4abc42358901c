//! # stepwise-solver
//!
//! External tools used by each branch: the deck builder (`glpsol --wlp`) and
//! the optimizers. Both run as subprocesses with a wall-clock timeout and a
//! shared [`stepwise_core::CancelToken`]; their output is logged into the
//! branch workspace.
//!
//! | Solver | Binary | Solution |
//! |--------|--------|----------|
//! | CBC | `cbc` | `-solu` text |
//! | GLPK | `glpsol` | printable report |
//! | Gurobi | `gurobi_cl` | `ResultFile` |
//! | CPLEX | `cplex` | XML |

pub mod deck;
pub mod error;
pub mod solver;
pub mod subprocess;

pub use deck::{DeckBuilder, GlpsolDeckBuilder, GLPSOL};
pub use error::{ExitCode, SolverError, SolverResult};
pub use solver::{CommandSolver, Solver};
pub use subprocess::{find_binary, ToolProcess};

use serde::{Deserialize, Serialize};
use stepwise_io::SolutionFormat;

/// Supported optimizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverId {
    Cbc,
    Glpk,
    Gurobi,
    Cplex,
}

impl SolverId {
    pub fn binary_name(&self) -> &'static str {
        match self {
            SolverId::Cbc => "cbc",
            SolverId::Glpk => "glpsol",
            SolverId::Gurobi => "gurobi_cl",
            SolverId::Cplex => "cplex",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SolverId::Cbc => "CBC",
            SolverId::Glpk => "GLPK",
            SolverId::Gurobi => "Gurobi",
            SolverId::Cplex => "CPLEX",
        }
    }

    pub fn solution_format(&self) -> SolutionFormat {
        match self {
            SolverId::Cbc => SolutionFormat::Cbc,
            SolverId::Glpk => SolutionFormat::Glpk,
            SolverId::Gurobi => SolutionFormat::Gurobi,
            SolverId::Cplex => SolutionFormat::Cplex,
        }
    }

    pub fn all() -> &'static [SolverId] {
        &[SolverId::Cbc, SolverId::Glpk, SolverId::Gurobi, SolverId::Cplex]
    }
}

impl std::fmt::Display for SolverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for SolverId {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cbc" => Ok(SolverId::Cbc),
            "glpk" | "glpsol" => Ok(SolverId::Glpk),
            "gurobi" => Ok(SolverId::Gurobi),
            "cplex" => Ok(SolverId::Cplex),
            _ => Err(SolverError::UnknownSolver(s.to_string())),
        }
    }
}

/// Check that the deck builder and `solver` are installed.
pub fn check_tools(solver: SolverId) -> SolverResult<()> {
    find_binary(GLPSOL)?;
    find_binary(solver.binary_name())?;
    Ok(())
}
