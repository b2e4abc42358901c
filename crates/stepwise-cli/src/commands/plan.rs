use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use stepwise_cli::cli::{PlanArgs, PlanFormat};
use stepwise_cli::config::PlanSettings;
use stepwise_core::{plan_steps, Dataset, Decision, Horizon, ScenarioTree, Step, StepError};
use stepwise_io::{load_decisions, read_dataset};
use stepwise_scenarios::PlanManifest;
use tabwriter::TabWriter;
use tracing::info;

/// Reference data, steps and decisions of a project.
pub struct PlanInputs {
    pub reference: Dataset,
    pub steps: Vec<Step>,
    pub decisions: Vec<Decision>,
}

pub fn load_inputs(settings: &PlanSettings) -> Result<PlanInputs> {
    if !settings.input_data.is_dir() {
        return Err(StepError::config(format!(
            "input data directory '{}' does not exist",
            settings.input_data.display()
        ))
        .into());
    }
    let reference = read_dataset(&settings.input_data)?;
    let horizon = Horizon::from_unsorted(reference.years()?)?;
    let steps = plan_steps(&horizon, settings.step_length, settings.foresight)?;

    let decisions = match &settings.decisions {
        Some(root) => load_decisions(root)?,
        None => {
            info!("no decision source, planning a single scenario");
            Vec::new()
        }
    };
    info!(
        years = horizon.len(),
        steps = steps.len(),
        decisions = decisions.len(),
        "loaded project inputs"
    );
    Ok(PlanInputs {
        reference,
        steps,
        decisions,
    })
}

fn year_span(years: &[i32]) -> String {
    match (years.first(), years.last()) {
        (Some(first), Some(last)) if first != last => format!("{first}-{last}"),
        (Some(first), _) => first.to_string(),
        _ => "-".to_string(),
    }
}

fn print_plan(plan: &PlanManifest) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "STEP\tACTUAL\tMODELLED\tBRANCHES")?;
    for step in &plan.steps {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            step.index,
            year_span(&step.actual_years),
            year_span(&step.modelled_years),
            step.branches.join(" ")
        )?;
    }
    writer.flush()?;
    println!("Scenarios ({}):", plan.scenarios.len());
    for scenario in &plan.scenarios {
        println!("  {scenario}");
    }
    Ok(())
}

pub fn handle(project: &Path, args: &PlanArgs) -> Result<()> {
    let settings = PlanSettings::resolve(project, &args.horizon)?;
    let inputs = load_inputs(&settings)?;
    let tree = ScenarioTree::build(inputs.steps.len(), &inputs.decisions)?;
    let plan = PlanManifest::from_tree(&inputs.steps, &tree);
    match args.format {
        PlanFormat::Plain => print_plan(&plan),
        PlanFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
    }
}
