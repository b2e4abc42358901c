use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stepwise", author, version, about = "Multi-step scenario runs for capacity expansion models", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    /// Also append logs to this file
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Project root
    #[arg(short = 'C', long, default_value = ".", global = true, value_hint = ValueHint::DirPath)]
    pub project: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the project directory layout
    Setup,
    /// Print steps and scenario branches without solving
    Plan(PlanArgs),
    /// Solve every step of every scenario
    Run(RunArgs),
}

/// Options shared by `plan` and `run`.
#[derive(Args, Debug, Clone, Default)]
pub struct HorizonArgs {
    /// Step length in years; a second value sets the length of later steps
    #[arg(short = 's', long = "step-length", num_args = 1..=2, value_delimiter = ',')]
    pub step_length: Vec<i64>,

    /// Extra lookahead years beyond each step (default: one more step)
    #[arg(long)]
    pub foresight: Option<usize>,

    /// Directory with the reference input tables
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub input_data: Option<PathBuf>,

    /// Decision source directory (`<step>/<Decision>.csv`)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub decisions: Option<PathBuf>,

    /// Project config file (default: <project>/stepwise.toml)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub horizon: HorizonArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = PlanFormat::Plain)]
    pub format: PlanFormat,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub horizon: HorizonArgs,

    /// Solver: cbc, glpk, gurobi or cplex
    #[arg(long)]
    pub solver: Option<String>,

    /// Parallel branch workers (0 = auto-detect CPU count)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Wall-clock limit per tool invocation in seconds (0 = none)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Model definition passed to the deck builder
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub model_file: Option<PathBuf>,

    /// Prune failed branches and keep going (`--keep-going false` stops at the first failure)
    #[arg(long, action = clap::ArgAction::Set)]
    pub keep_going: Option<bool>,
}
