//! Decision source loader.
//!
//! Decisions live under a directory with one subdirectory per step, each
//! holding one table per decision: `<root>/<step>/<Name>.csv`. Files with the
//! `.table` extension are read the same way.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stepwise_core::{Decision, StepError};
use tracing::{info, warn};

use crate::csv_store::read_table;

const DECISION_EXTENSIONS: [&str; 2] = ["csv", "table"];

/// Load every decision under `root`, ordered by step then name.
///
/// A missing root is a configuration error. An empty root means a run
/// without decisions.
pub fn load_decisions(root: &Path) -> Result<Vec<Decision>> {
    if !root.is_dir() {
        return Err(StepError::config(format!(
            "decision source {} does not exist",
            root.display()
        ))
        .into());
    }

    let mut decisions = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("listing {}", root.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(step) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<usize>().ok())
        else {
            warn!(dir = %path.display(), "skipping non-numeric decision directory");
            continue;
        };
        decisions.extend(load_step(&path, step)?);
    }

    decisions.sort_by(|a, b| (a.step, &a.name).cmp(&(b.step, &b.name)));
    info!(
        count = decisions.len(),
        source = %root.display(),
        "loaded decisions"
    );
    Ok(decisions)
}

fn load_step(dir: &Path, step: usize) -> Result<Vec<Decision>> {
    let mut decisions = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let is_decision = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| DECISION_EXTENSIONS.contains(&e));
        if !path.is_file() || !is_decision {
            continue;
        }
        let table = read_table(&path)?;
        let name = table.name().to_string();
        if let Some(first) = seen.insert(name.clone(), path.clone()) {
            return Err(StepError::config(format!(
                "decision '{name}' is defined twice in step {step}: {} and {}",
                first.display(),
                path.display()
            ))
            .into());
        }
        let decision = Decision::from_table(&name, step, &table)
            .with_context(|| format!("reading decision {}", path.display()))?;
        decisions.push(decision);
    }
    Ok(decisions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "OPTION,PARAMETER,REGION,TECHNOLOGY,YEAR,VALUE\n";

    #[test]
    fn loads_decisions_by_step() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1")).unwrap();
        fs::create_dir_all(dir.path().join("2")).unwrap();
        fs::create_dir_all(dir.path().join("drafts")).unwrap();
        fs::write(
            dir.path().join("1/B.csv"),
            format!("{HEADER}0,CapitalCost,UTOPIA,E01,1995,100\n1,CapitalCost,UTOPIA,E01,1995,200\n"),
        )
        .unwrap();
        fs::write(
            dir.path().join("1/A.csv"),
            format!("{HEADER}0,CapitalCost,UTOPIA,E01,,5%\n"),
        )
        .unwrap();
        fs::write(
            dir.path().join("2/C.table"),
            format!("{HEADER}0,CapitalCost,UTOPIA,E01,2000,1\n"),
        )
        .unwrap();

        let decisions = load_decisions(dir.path()).unwrap();
        let names: Vec<(usize, &str)> = decisions.iter().map(|d| (d.step, d.name.as_str())).collect();
        assert_eq!(names, vec![(1, "A"), (1, "B"), (2, "C")]);
        assert_eq!(decisions[1].options.len(), 2);
    }

    #[test]
    fn missing_source_is_configuration_error() {
        let dir = tempdir().unwrap();
        let err = load_decisions(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::Configuration(_))
        ));
    }

    #[test]
    fn same_name_twice_in_a_step_is_rejected() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1")).unwrap();
        let body = format!("{HEADER}0,CapitalCost,UTOPIA,E01,1995,100\n");
        fs::write(dir.path().join("1/A.csv"), &body).unwrap();
        fs::write(dir.path().join("1/A.table"), &body).unwrap();

        let err = load_decisions(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::Configuration(_))
        ));
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn same_name_in_different_steps_is_allowed() {
        let dir = tempdir().unwrap();
        let body = format!("{HEADER}0,CapitalCost,UTOPIA,E01,2000,100\n");
        for step in ["1", "2"] {
            fs::create_dir_all(dir.path().join(step)).unwrap();
            fs::write(dir.path().join(step).join("A.csv"), &body).unwrap();
        }
        assert_eq!(load_decisions(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn rule_at_step_zero_is_rejected() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("0")).unwrap();
        fs::write(
            dir.path().join("0/A.csv"),
            format!("{HEADER}0,CapitalCost,UTOPIA,E01,,-1\n"),
        )
        .unwrap();
        let err = load_decisions(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::Configuration(_))
        ));
    }
}
