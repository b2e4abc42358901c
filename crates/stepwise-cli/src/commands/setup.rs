use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use stepwise_scenarios::{WorkspaceLayout, PROJECT_DIRS};
use tracing::info;

use stepwise_cli::config::CONFIG_FILE;

const CONFIG_TEMPLATE: &str = r#"# Step length in years; two values give the first step its own length.
step_length = [5]
# foresight = 5
solver = "cbc"
# 0 uses one worker per CPU.
workers = 0
timeout_secs = 0
keep_going = true
# model_file = "model/osemosys.txt"
# input_data = "data"
# decisions = "data/scenarios"

[defaults]

[results]
"#;

pub fn handle(project: &Path) -> Result<()> {
    let layout = WorkspaceLayout::new(project);
    layout.setup()?;

    let config = project.join(CONFIG_FILE);
    if !config.exists() {
        fs::write(&config, CONFIG_TEMPLATE)
            .with_context(|| format!("writing {}", config.display()))?;
        info!(path = %config.display(), "wrote config template");
    }

    println!("Project layout ready at {}", project.display());
    for dir in PROJECT_DIRS {
        println!("  {dir}/");
    }
    Ok(())
}
