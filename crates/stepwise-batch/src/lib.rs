//! Branch execution and step orchestration.
//!
//! Every step runs its live branches through [`run_pipeline`] on a bounded
//! [`BranchPool`]. The [`Orchestrator`] waits for the whole step, prunes
//! failed branches, carries new capacity into the next step and merges
//! results into the per-scenario [`ResultStore`].

pub mod manifest;
pub mod orchestrator;
pub mod pipeline;
pub mod runner;
pub mod store;

pub use manifest::{load_run_manifest, write_run_manifest, BranchRecord, RunManifest};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunSummary};
pub use pipeline::{run_pipeline, BranchOutcome, Collaborators, Stage};
pub use runner::BranchPool;
pub use store::ResultStore;
