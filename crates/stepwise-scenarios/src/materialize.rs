//! Branch workspace materialisation.
//!
//! Every live branch of a step gets its own copy of the step's reference
//! data with the options along its path applied on top, plus the residual
//! capacity carried from its predecessor.

use std::fs;

use anyhow::{Context, Result};
use stepwise_core::carry::RESIDUAL_CAPACITY;
use stepwise_core::{
    overlay_residual, BranchNode, BranchPath, Dataset, Decision, OptionRow, OptionValue, Row,
    Step, StepError, StepResult, Table,
};
use stepwise_io::{read_dataset, write_dataset};
use tracing::{debug, info};

use crate::workspace::{Workspace, WorkspaceLayout};

/// Apply option rows onto `data` for `step`.
///
/// Rows with a year outside the step's modelled years are skipped. Change
/// rules are evaluated for every modelled year from the value the branch's
/// predecessor had in the year before the step. Matching keys are
/// overwritten, new keys appended.
pub fn apply_option_rows<'a>(
    data: &mut Dataset,
    rows: impl IntoIterator<Item = &'a OptionRow>,
    step: &Step,
    predecessor: Option<&Dataset>,
) -> StepResult<()> {
    for row in rows {
        let table = data.get_mut(&row.parameter).ok_or_else(|| {
            StepError::config(format!(
                "option {} overrides {} which is not in the input data",
                row.option, row.parameter
            ))
        })?;
        let index = table.index().to_vec();

        match &row.value {
            OptionValue::Fixed(value) => {
                if table.has_year() && !row.year.is_some_and(|y| step.is_modelled(y)) {
                    continue;
                }
                let key = row.key_for(&index, row.year)?;
                table.upsert(Row {
                    key,
                    value: value.clone(),
                })?;
            }
            OptionValue::Rule(rule) => {
                if !table.has_year() {
                    return Err(StepError::config(format!(
                        "option {} uses a change rule on {}, which has no YEAR column",
                        row.option, row.parameter
                    )));
                }
                let previous = predecessor.ok_or_else(|| {
                    StepError::config(format!(
                        "option {} uses a change rule at step {} without a prior step",
                        row.option, step.index
                    ))
                })?;
                let base_year = step.base_year();
                let base_key = row.key_for(&index, Some(base_year))?;
                let base = previous
                    .get(&row.parameter)
                    .and_then(|t| t.get(&base_key))
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| {
                        StepError::config(format!(
                            "option {}: no {} value for {:?} in the prior step",
                            row.option, row.parameter, base_key
                        ))
                    })?;
                for &year in &step.modelled_years {
                    table.upsert(Row {
                        key: row.key_for(&index, Some(year))?,
                        value: rule.evaluate(base, base_year, year).into(),
                    })?;
                }
            }
        }
    }
    Ok(())
}

/// Builds branch workspaces from reference data and decisions.
pub struct WorkspaceMaterializer<'a> {
    layout: &'a WorkspaceLayout,
    reference: &'a Dataset,
    decisions: &'a [Decision],
}

impl<'a> WorkspaceMaterializer<'a> {
    pub fn new(layout: &'a WorkspaceLayout, reference: &'a Dataset, decisions: &'a [Decision]) -> Self {
        Self {
            layout,
            reference,
            decisions,
        }
    }

    fn option_rows<'p>(&'p self, path: &'p BranchPath) -> impl Iterator<Item = &'p OptionRow> + 'p {
        path.options().flat_map(move |(step, option)| {
            self.decisions
                .iter()
                .filter(move |d| d.step == step && d.name == option.decision)
                .flat_map(move |d| d.rows_for(option))
        })
    }

    /// Input data of `path` at `step`, without touching the filesystem.
    pub fn step_input(
        &self,
        path: &BranchPath,
        step: &Step,
        carried: Option<&Table>,
        predecessor: Option<&Dataset>,
    ) -> StepResult<Dataset> {
        let mut data = self.reference.filter_years(&step.modelled_years);
        apply_option_rows(&mut data, self.option_rows(path), step, predecessor)?;

        if let Some(carried) = carried {
            match overlay_residual(data.get(RESIDUAL_CAPACITY), carried, &step.modelled_years)? {
                Some(residual) => {
                    data.insert(residual);
                }
                None => debug!(branch = %path, step = step.index, "no residual capacity left to carry"),
            }
        }
        Ok(data)
    }

    /// Create the workspace of `node` and write its input data.
    ///
    /// `predecessor` is the workspace of the node's parent at the previous
    /// step; change rules read their base values from it.
    pub fn materialize(
        &self,
        node: &BranchNode,
        step: &Step,
        carried: Option<&Table>,
        predecessor: Option<&Workspace>,
    ) -> Result<Workspace> {
        let previous = match predecessor {
            Some(ws) if self.needs_predecessor(&node.path) => Some(
                read_dataset(&ws.data_dir())
                    .with_context(|| format!("reading predecessor input of {}", node.path))?,
            ),
            _ => None,
        };

        let data = self.step_input(&node.path, step, carried, previous.as_ref())?;
        let workspace = Workspace {
            branch: node.id,
            step: step.index,
            path: node.path.clone(),
            dir: self.layout.branch_dir(step.index, &node.path),
        };
        if workspace.dir.exists() {
            fs::remove_dir_all(&workspace.dir)
                .with_context(|| format!("clearing {}", workspace.dir.display()))?;
        }
        write_dataset(&data, &workspace.data_dir())?;
        fs::create_dir_all(workspace.results_dir())?;
        info!(branch = %node.path, step = step.index, dir = %workspace.dir.display(), "materialised workspace");
        Ok(workspace)
    }

    fn needs_predecessor(&self, path: &BranchPath) -> bool {
        self.option_rows(path)
            .any(|row| matches!(row.value, OptionValue::Rule(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::{
        plan_steps, Horizon, OptionId, ScenarioTree, StepLength, Value, YEAR,
    };
    use stepwise_core::decision::{ChangeRule, PARAMETER, OPTION};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn reference() -> Dataset {
        let mut years = Table::set(YEAR);
        let mut cap = Table::new("TotalAnnualMaxCapacity", ["REGION", "TECHNOLOGY", YEAR]);
        let mut residual = Table::new(RESIDUAL_CAPACITY, ["REGION", "TECHNOLOGY", YEAR]);
        for y in 1990..2000 {
            years.push(Row::new(Vec::<String>::new(), f64::from(y))).unwrap();
            cap.push(Row::new(["UTOPIA".to_string(), "E01".into(), y.to_string()], 10.0)).unwrap();
            residual.push(Row::new(["UTOPIA".to_string(), "E01".into(), y.to_string()], 1.0)).unwrap();
        }
        [years, cap, residual].into_iter().collect()
    }

    fn row(option: &str, year: Option<i32>, value: OptionValue) -> OptionRow {
        let mut columns = BTreeMap::new();
        columns.insert("REGION".to_string(), "UTOPIA".to_string());
        columns.insert("TECHNOLOGY".to_string(), "E01".to_string());
        OptionRow {
            option: OptionId::new("A", option),
            parameter: "TotalAnnualMaxCapacity".into(),
            columns,
            year,
            value,
        }
    }

    fn steps() -> Vec<Step> {
        let horizon = Horizon::new((1990..2000).collect()).unwrap();
        plan_steps(&horizon, StepLength::Uniform(5), None).unwrap()
    }

    fn value_at(data: &Dataset, table: &str, year: i32) -> f64 {
        let key = vec!["UTOPIA".to_string(), "E01".into(), year.to_string()];
        data.get(table).unwrap().get(&key).unwrap().as_f64().unwrap()
    }

    #[test]
    fn fixed_rows_respect_modelled_years() {
        let steps = steps();
        let mut data = reference().filter_years(&steps[1].modelled_years);
        let rows = vec![
            row("0", Some(1996), OptionValue::Fixed(Value::Number(3.0))),
            row("0", Some(1991), OptionValue::Fixed(Value::Number(99.0))),
        ];
        apply_option_rows(&mut data, &rows, &steps[1], None).unwrap();
        assert_eq!(value_at(&data, "TotalAnnualMaxCapacity", 1996), 3.0);
        assert_eq!(data.get("TotalAnnualMaxCapacity").unwrap().len(), 5);
    }

    #[test]
    fn later_options_win_on_overlap() {
        let steps = steps();
        let mut data = reference().filter_years(&steps[0].modelled_years);
        let rows = vec![
            row("0", Some(1992), OptionValue::Fixed(Value::Number(3.0))),
            row("1", Some(1992), OptionValue::Fixed(Value::Number(4.0))),
        ];
        apply_option_rows(&mut data, &rows, &steps[0], None).unwrap();
        assert_eq!(value_at(&data, "TotalAnnualMaxCapacity", 1992), 4.0);
        let once = data.clone();
        apply_option_rows(&mut data, &rows, &steps[0], None).unwrap();
        assert_eq!(data, once);
    }

    #[test]
    fn growth_rule_reads_predecessor_value() {
        let steps = steps();
        let mut previous = reference().filter_years(&steps[0].modelled_years);
        previous
            .get_mut("TotalAnnualMaxCapacity")
            .unwrap()
            .upsert(Row::new(["UTOPIA", "E01", "1994"], 100.0))
            .unwrap();
        let mut data = reference().filter_years(&steps[1].modelled_years);
        let rows = vec![row("0", None, OptionValue::Rule(ChangeRule::Growth(0.1)))];
        apply_option_rows(&mut data, &rows, &steps[1], Some(&previous)).unwrap();
        assert!((value_at(&data, "TotalAnnualMaxCapacity", 1995) - 110.0).abs() < 1e-9);
        assert!((value_at(&data, "TotalAnnualMaxCapacity", 1996) - 121.0).abs() < 1e-9);

        let err = apply_option_rows(&mut data, &rows, &steps[1], None).unwrap_err();
        assert!(matches!(err, StepError::Configuration(_)));
    }

    #[test]
    fn materialize_writes_branch_input_with_carried_capacity() {
        let dir = tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let mut table = Table::new("A", [OPTION, PARAMETER, "REGION", "TECHNOLOGY", YEAR]);
        table.push(Row::new(["0", "TotalAnnualMaxCapacity", "UTOPIA", "E01", "1996"], 5.0)).unwrap();
        table.push(Row::new(["1", "TotalAnnualMaxCapacity", "UTOPIA", "E01", "1996"], 6.0)).unwrap();
        let decisions = vec![Decision::from_table("A", 1, &table).unwrap()];
        let tree = ScenarioTree::build(2, &decisions).unwrap();
        let reference = reference();
        let materializer = WorkspaceMaterializer::new(&layout, &reference, &decisions);

        let mut carried = Table::new(RESIDUAL_CAPACITY, ["REGION", "TECHNOLOGY", YEAR]);
        carried.push(Row::new(["UTOPIA", "E01", "1996"], 2.0)).unwrap();

        let steps = steps();
        let node = tree.node(tree.level(1)[1]);
        let ws = materializer.materialize(node, &steps[1], Some(&carried), None).unwrap();
        assert_eq!(ws.dir, dir.path().join("steps/step_1/1A1"));

        let written = read_dataset(&ws.data_dir()).unwrap();
        assert_eq!(written.years().unwrap(), (1995..2000).collect::<Vec<_>>());
        assert_eq!(value_at(&written, "TotalAnnualMaxCapacity", 1996), 6.0);
        assert_eq!(value_at(&written, RESIDUAL_CAPACITY, 1996), 3.0);
        assert_eq!(value_at(&written, RESIDUAL_CAPACITY, 1997), 1.0);
    }
}
