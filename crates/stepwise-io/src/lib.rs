//! # stepwise-io
//!
//! File formats for stepwise runs:
//!
//! - [`csv_store`]: CSV directories as [`stepwise_core::Dataset`]s
//! - [`decisions`]: the per-step decision source
//! - [`datafile`]: GNU MathProg datafiles
//! - [`solution`]: CBC, GLPK, Gurobi and CPLEX solution files
//! - [`exchange`]: the [`DataExchange`] seam used by the execution pipeline

pub mod csv_store;
pub mod datafile;
pub mod decisions;
pub mod exchange;
pub mod solution;

pub use csv_store::{read_dataset, read_table, write_dataset, write_table};
pub use datafile::{read_datafile, render_datafile, write_datafile, ParamDefaults};
pub use decisions::load_decisions;
pub use exchange::{DataExchange, MathProgExchange};
pub use solution::{
    read_status, read_variables, solution_path, NativeSolution, ResultSchema, SolutionFormat,
    SolutionStatus, VariableValue,
};
