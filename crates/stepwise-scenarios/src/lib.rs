//! # stepwise-scenarios
//!
//! Maps scenario tree branches onto isolated workspaces on disk.
//!
//! - [`workspace`]: project layout, branch directories and the workspace arena
//! - [`materialize`]: reference data copy and option application per branch
//! - [`manifest`]: the plan manifest written before solving

pub mod manifest;
pub mod materialize;
pub mod workspace;

pub use manifest::{load_plan, write_plan, PlanManifest, StepPlan};
pub use materialize::{apply_option_rows, WorkspaceMaterializer};
pub use workspace::{Workspace, WorkspaceArena, WorkspaceLayout, PROJECT_DIRS};
