//! Error taxonomy for stepwise runs.
//!
//! Errors fall into two classes. Fatal errors ([`StepError::Configuration`],
//! [`StepError::AllBranchesFailed`], [`StepError::Cancelled`]) abort the run
//! before or between steps. Branch errors ([`StepError::BuildFailure`],
//! [`StepError::InfeasibleOrUnsolved`]) prune one branch and its descendants
//! and are otherwise only logged.

use thiserror::Error;

/// Unified error type for step planning, tree construction and branch execution.
#[derive(Error, Debug)]
pub enum StepError {
    /// Bad step sizes, missing decision source, malformed decision rows.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Model-form or solver deck generation failed for one branch.
    #[error("Build failure for branch {branch}: {message}")]
    BuildFailure { branch: String, message: String },

    /// The solver ran but did not return an optimal or feasible solution.
    #[error("Branch {branch} infeasible or unsolved: {message}")]
    InfeasibleOrUnsolved { branch: String, message: String },

    /// Every branch of a step failed, or the tree root failed.
    #[error("All branches failed at step {step}: {reason}")]
    AllBranchesFailed { step: usize, reason: String },

    /// The run was cancelled while branches were in flight.
    #[error("Run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tabular data did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

impl StepError {
    pub fn config(message: impl Into<String>) -> Self {
        StepError::Configuration(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        StepError::Parse(message.into())
    }

    /// True when the error aborts the whole run rather than a single branch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StepError::Configuration(_) | StepError::AllBranchesFailed { .. } | StepError::Cancelled
        )
    }

    /// Short stage-independent label used in run manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Configuration(_) => "configuration",
            StepError::BuildFailure { .. } => "build_failure",
            StepError::InfeasibleOrUnsolved { .. } => "infeasible_or_unsolved",
            StepError::AllBranchesFailed { .. } => "all_branches_failed",
            StepError::Cancelled => "cancelled",
            StepError::Io(_) => "io",
            StepError::Parse(_) => "parse",
            StepError::Other(_) => "other",
        }
    }
}

/// Convenience alias for results carrying a [`StepError`].
pub type StepResult<T> = Result<T, StepError>;

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StepError>() {
            Ok(step_err) => step_err,
            Err(other) => StepError::Other(format!("{other:#}")),
        }
    }
}

impl From<std::num::ParseIntError> for StepError {
    fn from(err: std::num::ParseIntError) -> Self {
        StepError::Parse(err.to_string())
    }
}

impl From<std::num::ParseFloatError> for StepError {
    fn from(err: std::num::ParseFloatError) -> Self {
        StepError::Parse(err.to_string())
    }
}
