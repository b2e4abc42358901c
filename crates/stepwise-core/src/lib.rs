//! # stepwise-core: multi-stage scenario planning
//!
//! Domain types and pure algorithms for running a capacity-expansion model in
//! sequential steps with branching policy options.
//!
//! ## Pieces
//!
//! - [`horizon`]: split the horizon into steps with a foresight window
//! - [`table`]: the tabular row store shared by inputs and results
//! - [`decision`]: decision axes, option rows and change rules
//! - [`tree`]: scenario tree of branch paths with failure pruning
//! - [`carry`]: residual capacity carried from one step to the next
//! - [`aggregate`]: stitching step results into one series per scenario
//!
//! Nothing here touches a solver or spawns processes; those live in
//! `stepwise-solver` and `stepwise-batch`.

pub mod aggregate;
pub mod cancel;
pub mod carry;
pub mod decision;
pub mod error;
pub mod horizon;
pub mod table;
pub mod tree;

pub use aggregate::{merge_step_results, merge_step_table};
pub use cancel::CancelToken;
pub use carry::{carry_forward, overlay_residual, OperationalLife};
pub use decision::{ChangeRule, Decision, OptionId, OptionRow, OptionValue};
pub use error::{StepError, StepResult};
pub use horizon::{plan_steps, Horizon, Step, StepLength};
pub use table::{Dataset, Row, Table, Value, VALUE, YEAR};
pub use tree::{BranchId, BranchNode, BranchPath, BranchStatus, OptionGroup, ScenarioTree};
