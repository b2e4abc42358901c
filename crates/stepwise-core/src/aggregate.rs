//! Stitching step results into one series per scenario.

use crate::error::{StepError, StepResult};
use crate::table::{Dataset, Table};

/// Merge one step's result table into a scenario's consolidated table.
///
/// **Algorithm:** year-indexed tables are first restricted to the step's
/// `actual_years`; tables without a year dimension are taken whole. When no
/// consolidated table exists yet the incoming rows become it. Otherwise rows
/// are concatenated and de-duplicated on the full index key, keeping the row
/// merged last.
pub fn merge_step_table(
    existing: Option<Table>,
    incoming: &Table,
    actual_years: &[i32],
) -> StepResult<Table> {
    let step_rows = incoming.filter_years(actual_years);
    let Some(mut merged) = existing else {
        let mut fresh = step_rows;
        fresh.dedup_keep_last();
        return Ok(fresh);
    };

    if merged.index() != step_rows.index() {
        return Err(StepError::parse(format!(
            "cannot merge {}: columns {:?} do not match {:?}",
            incoming.name(),
            step_rows.index(),
            merged.index()
        )));
    }

    merged.upsert_all(step_rows.into_rows())?;
    Ok(merged)
}

/// Merge every table of a step's results into `scenario`.
pub fn merge_step_results(
    scenario: &mut Dataset,
    step_results: &Dataset,
    actual_years: &[i32],
) -> StepResult<()> {
    for table in step_results.tables() {
        let existing = scenario.remove(table.name());
        let mut merged = merge_step_table(existing, table, actual_years)?;
        merged.sort();
        scenario.insert(merged);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Row, Value, YEAR};

    fn new_capacity(rows: &[(i32, f64)]) -> Table {
        let mut table = Table::new("NewCapacity", ["REGION", "TECHNOLOGY", YEAR]);
        for (year, value) in rows {
            table
                .push(Row::new(["UTOPIA".to_string(), "E01".into(), year.to_string()], *value))
                .unwrap();
        }
        table
    }

    #[test]
    fn sequential_steps_never_duplicate_keys() {
        let step0 = new_capacity(&[(1990, 1.0), (1991, 1.0), (1992, 9.0), (1993, 9.0)]);
        let step1 = new_capacity(&[(1992, 2.0), (1993, 2.0)]);
        let merged = merge_step_table(None, &step0, &[1990, 1991]).unwrap();
        let merged = merge_step_table(Some(merged), &step1, &[1992, 1993]).unwrap();

        assert_eq!(merged.len(), 4);
        let mut keys: Vec<_> = merged.rows().iter().map(|r| r.key.clone()).collect();
        keys.dedup();
        assert_eq!(keys.len(), 4);
        let key: Vec<String> = vec!["UTOPIA".into(), "E01".into(), "1992".into()];
        assert_eq!(merged.get(&key), Some(&Value::Number(2.0)));
    }

    #[test]
    fn tables_without_year_are_copied_whole() {
        let mut cost = Table::new("TotalDiscountedCost", ["REGION"]);
        cost.push(Row::new(["UTOPIA"], 10.0)).unwrap();
        let merged = merge_step_table(None, &cost, &[1990]).unwrap();
        assert_eq!(merged.len(), 1);

        let mut later = Table::new("TotalDiscountedCost", ["REGION"]);
        later.push(Row::new(["UTOPIA"], 12.0)).unwrap();
        let merged = merge_step_table(Some(merged), &later, &[1995]).unwrap();
        assert_eq!(merged.rows()[0].value, Value::Number(12.0));
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let merged = merge_step_table(None, &new_capacity(&[(1990, 1.0)]), &[1990]).unwrap();
        let other = Table::new("NewCapacity", ["TECHNOLOGY", YEAR]);
        assert!(merge_step_table(Some(merged), &other, &[1990]).is_err());
    }

    #[test]
    fn large_tables_merge_by_key() {
        let technologies: Vec<String> = (0..400).map(|t| format!("T{t:03}")).collect();
        let activity = |years: std::ops::Range<i32>, value: f64| {
            let mut table = Table::new("RateOfActivity", ["REGION", "TECHNOLOGY", YEAR]);
            for tech in &technologies {
                for year in years.clone() {
                    table
                        .push(Row::new(["R1".to_string(), tech.clone(), year.to_string()], value))
                        .unwrap();
                }
            }
            table
        };
        // Step 0 models 2000..2030 but keeps 2000..2015; step 1 rewrites 2015..2030.
        let step0 = activity(2000..2030, 1.0);
        let step1 = activity(2015..2030, 2.0);
        let actual0: Vec<i32> = (2000..2015).collect();
        let actual1: Vec<i32> = (2015..2030).collect();

        let merged = merge_step_table(None, &step0, &actual0).unwrap();
        assert_eq!(merged.len(), 400 * 15);
        let merged = merge_step_table(Some(merged), &step1, &actual1).unwrap();
        assert_eq!(merged.len(), 400 * 30);

        let key = |tech: &str, year: i32| vec!["R1".to_string(), tech.to_string(), year.to_string()];
        assert_eq!(merged.get(&key("T000", 2014)), Some(&Value::Number(1.0)));
        assert_eq!(merged.get(&key("T399", 2015)), Some(&Value::Number(2.0)));
        assert_eq!(merged.get(&key("T200", 2029)), Some(&Value::Number(2.0)));
    }

    #[test]
    fn overlapping_rows_overwrite_in_place() {
        let step0 = new_capacity(&[(1990, 1.0), (1991, 1.0)]);
        let merged = merge_step_table(None, &step0, &[1990, 1991]).unwrap();
        let step1 = new_capacity(&[(1991, 3.0), (1992, 4.0), (1992, 5.0)]);
        let merged = merge_step_table(Some(merged), &step1, &[1991, 1992]).unwrap();
        let values: Vec<_> = merged.rows().iter().map(|r| r.value.clone()).collect();
        assert_eq!(
            values,
            vec![Value::Number(1.0), Value::Number(3.0), Value::Number(5.0)]
        );
    }

    #[test]
    fn dataset_merge_sorts_rows() {
        let mut scenario = Dataset::new();
        let results: Dataset = [new_capacity(&[(1991, 1.0), (1990, 1.0)])].into_iter().collect();
        merge_step_results(&mut scenario, &results, &[1990, 1991]).unwrap();
        let table = scenario.get("NewCapacity").unwrap();
        assert_eq!(table.rows()[0].key[2], "1990");
    }
}
