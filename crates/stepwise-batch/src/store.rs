//! Consolidated per-scenario result store.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use stepwise_core::{merge_step_results, BranchPath, Dataset};
use stepwise_io::write_dataset;
use stepwise_scenarios::WorkspaceLayout;
use tracing::{debug, info};

/// Result tables per scenario, merged step by step.
///
/// Merges happen in memory. [`ResultStore::persist`] writes every scenario
/// through a staging directory, so a scenario directory on disk always holds
/// a complete set of steps.
pub struct ResultStore {
    layout: WorkspaceLayout,
    scenarios: BTreeMap<BranchPath, Dataset>,
}

impl ResultStore {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self {
            layout,
            scenarios: BTreeMap::new(),
        }
    }

    pub fn merge(&mut self, scenario: &BranchPath, step_results: &Dataset, actual_years: &[i32]) -> Result<()> {
        let entry = self.scenarios.entry(scenario.clone()).or_default();
        merge_step_results(entry, step_results, actual_years)
            .with_context(|| format!("merging results into scenario {scenario}"))?;
        Ok(())
    }

    pub fn get(&self, scenario: &BranchPath) -> Option<&Dataset> {
        self.scenarios.get(scenario)
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &BranchPath> {
        self.scenarios.keys()
    }

    /// Drop a scenario from memory and disk.
    pub fn remove(&mut self, scenario: &BranchPath) -> Result<()> {
        self.scenarios.remove(scenario);
        let dir = self.layout.scenario_dir(scenario);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("removing results {}", dir.display()))?;
        }
        debug!(%scenario, "removed scenario results");
        Ok(())
    }

    /// Write every scenario to `results/<path>`.
    pub fn persist(&self) -> Result<()> {
        let results = self.layout.results_dir();
        fs::create_dir_all(&results).with_context(|| format!("creating {}", results.display()))?;
        for (scenario, dataset) in &self.scenarios {
            let target = self.layout.scenario_dir(scenario);
            let staging = tempfile::Builder::new()
                .prefix(".staging-")
                .tempdir_in(&results)
                .context("creating result staging directory")?;
            write_dataset(dataset, staging.path())?;

            if target.exists() {
                fs::remove_dir_all(&target)
                    .with_context(|| format!("replacing {}", target.display()))?;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(staging.path(), &target)
                .with_context(|| format!("moving results into {}", target.display()))?;
        }
        info!(scenarios = self.scenarios.len(), "persisted results");
        Ok(())
    }

    pub fn scenario_dir(&self, scenario: &BranchPath) -> PathBuf {
        self.layout.scenario_dir(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::{Row, Table, YEAR};
    use stepwise_io::read_table;
    use tempfile::tempdir;

    fn results(rows: &[(i32, f64)]) -> Dataset {
        let mut table = Table::new("NewCapacity", ["REGION", "TECHNOLOGY", YEAR]);
        for (year, value) in rows {
            table
                .push(Row::new(["UTOPIA".to_string(), "E01".into(), year.to_string()], *value))
                .unwrap();
        }
        [table].into_iter().collect()
    }

    #[test]
    fn persist_writes_merged_scenarios() {
        let dir = tempdir().unwrap();
        let mut store = ResultStore::new(WorkspaceLayout::new(dir.path()));
        let base = BranchPath::root();
        store.merge(&base, &results(&[(1990, 1.0), (1991, 5.0)]), &[1990]).unwrap();
        store.merge(&base, &results(&[(1991, 2.0)]), &[1991]).unwrap();
        store.persist().unwrap();
        store.persist().unwrap();

        let table = read_table(&dir.path().join("results/base/NewCapacity.csv")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].value.as_f64(), Some(2.0));

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("results"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(leftovers.is_empty());

        store.remove(&base).unwrap();
        assert!(!dir.path().join("results/base").exists());
        assert!(store.get(&base).is_none());
    }
}
