pub mod cli;
pub mod config;

pub use cli::{Cli, Commands, HorizonArgs, PlanArgs, PlanFormat, RunArgs};
pub use config::{load_project_config, PlanSettings, ProjectConfig, RunSettings, CONFIG_FILE};
