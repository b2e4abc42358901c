//! Error types and exit codes for solver subprocesses.

use std::path::PathBuf;

use thiserror::Error;

/// How a tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    /// Non-zero exit status.
    Failure(i32),
    /// Ended by a signal, no status code.
    Terminated,
}

impl ExitCode {
    /// Convert from the raw status code of a finished process.
    pub fn from_raw(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitCode::Success,
            Some(code) => ExitCode::Failure(code),
            None => ExitCode::Terminated,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

/// Errors from building decks and running solvers.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Unknown solver: {0}")]
    UnknownSolver(String),

    /// Binary not found in `~/.stepwise/bin` or on `PATH`.
    #[error("{binary} is not installed or not on PATH ({hint})")]
    NotInstalled { binary: String, hint: String },

    #[error("Failed to start {program}: {source}")]
    ProcessStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed with exit code {exit_code:?}: {message}")]
    ProcessFailed {
        program: String,
        exit_code: ExitCode,
        message: String,
    },

    #[error("{program} timed out after {seconds} seconds")]
    Timeout { program: String, seconds: u64 },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("Solver wrote no solution at {0}")]
    MissingSolution(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SolverError {
    /// True when the error comes from the run being cancelled rather than
    /// from the branch itself.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SolverError::Cancelled { .. })
    }
}

pub type SolverResult<T> = Result<T, SolverError>;
