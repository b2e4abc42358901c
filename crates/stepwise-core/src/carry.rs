//! Residual capacity carry-forward between steps.
//!
//! Capacity built in a step stays available for its operational life. Before
//! the next step is materialised, the newly built capacity of the step's
//! actual years is spread over `[year, year + life)` and added to the branch's
//! residual capacity.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::error::{StepError, StepResult};
use crate::table::{Row, Table, Value, YEAR};

pub const RESIDUAL_CAPACITY: &str = "ResidualCapacity";
pub const NEW_CAPACITY: &str = "NewCapacity";
pub const OPERATIONAL_LIFE: &str = "OperationalLife";
pub const REGION: &str = "REGION";
pub const TECHNOLOGY: &str = "TECHNOLOGY";

/// Decimal places kept in carried capacity.
pub const CAPACITY_PRECISION: i32 = 4;

/// Lifetime used for technologies without an operational-life entry.
pub const DEFAULT_LIFETIME: u32 = 1;

/// Technology lifetimes in years.
///
/// Entries are keyed by `(region, technology)`. Entries without a region
/// apply to the technology in every region that has no entry of its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationalLife {
    regional: HashMap<(String, String), u32>,
    any_region: HashMap<String, u32>,
}

impl OperationalLife {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifetime of `technology` in every region.
    pub fn insert(&mut self, technology: impl Into<String>, years: u32) {
        self.any_region.insert(technology.into(), years);
    }

    pub fn insert_in(&mut self, region: impl Into<String>, technology: impl Into<String>, years: u32) {
        self.regional.insert((region.into(), technology.into()), years);
    }

    /// Read an `OperationalLife` table keyed by TECHNOLOGY, and by REGION
    /// when the table has that column.
    pub fn from_table(table: &Table) -> StepResult<Self> {
        let tech_pos = table.column_position(TECHNOLOGY).ok_or_else(|| {
            StepError::parse(format!("{} has no {TECHNOLOGY} column", table.name()))
        })?;
        let region_pos = table.column_position(REGION);
        let mut life = Self::new();
        for row in table.rows() {
            let years = row.value.as_f64().ok_or_else(|| {
                StepError::parse(format!(
                    "operational life '{}' of {} is not a number",
                    row.value, row.key[tech_pos]
                ))
            })?;
            let years = years.round().max(1.0) as u32;
            let technology = row.key[tech_pos].clone();
            match region_pos {
                Some(pos) => life.insert_in(row.key[pos].clone(), technology, years),
                None => life.insert(technology, years),
            }
        }
        Ok(life)
    }

    /// Lifetime of `technology` in `region`, defaulting to one year with a
    /// warning.
    pub fn lifetime(&self, region: &str, technology: &str) -> u32 {
        let found = self
            .regional
            .get(&(region.to_string(), technology.to_string()))
            .or_else(|| self.any_region.get(technology));
        match found {
            Some(years) => *years,
            None => {
                warn!(
                    region,
                    technology,
                    default = DEFAULT_LIFETIME,
                    "no operational life for technology, carrying capacity for its commissioning year only"
                );
                DEFAULT_LIFETIME
            }
        }
    }
}

pub fn round_capacity(value: f64) -> f64 {
    let scale = 10f64.powi(CAPACITY_PRECISION);
    (value * scale).round() / scale
}

fn capacity_index() -> Vec<String> {
    [REGION, TECHNOLOGY, YEAR].iter().map(|s| s.to_string()).collect()
}

fn key_positions(table: &Table) -> StepResult<(usize, usize, usize)> {
    let find = |column: &str| {
        table.column_position(column).ok_or_else(|| {
            StepError::parse(format!("{} has no {column} column", table.name()))
        })
    };
    Ok((find(REGION)?, find(TECHNOLOGY)?, find(YEAR)?))
}

type CapacityKey = (String, String, i32);

fn accumulate(table: &Table, into: &mut BTreeMap<CapacityKey, f64>) -> StepResult<()> {
    if table.is_empty() {
        return Ok(());
    }
    let (region, tech, year) = key_positions(table)?;
    for row in table.rows() {
        let y: i32 = row.key[year]
            .trim()
            .parse()
            .map_err(|_| StepError::parse(format!("bad year '{}' in {}", row.key[year], table.name())))?;
        let value = row.value.as_f64().ok_or_else(|| {
            StepError::parse(format!("non-numeric capacity '{}' in {}", row.value, table.name()))
        })?;
        *into
            .entry((row.key[region].clone(), row.key[tech].clone(), y))
            .or_insert(0.0) += value;
    }
    Ok(())
}

fn to_table(name: &str, values: BTreeMap<CapacityKey, f64>) -> StepResult<Table> {
    let mut table = Table::new(name, capacity_index());
    for ((region, tech, year), value) in values {
        table.push(Row::new([region, tech, year.to_string()], round_capacity(value)))?;
    }
    Ok(table)
}

/// Add a step's new capacity onto the prior residual capacity.
///
/// **Algorithm:** only `NewCapacity` rows in `actual_years` count. Each row
/// `(region, technology, year, value)` adds `value` to every year in
/// `[year, year + life)`. Rows are created when absent and every value is
/// rounded to [`CAPACITY_PRECISION`] decimals. The inputs are not modified, so
/// repeated calls with the same inputs give the same table.
pub fn carry_forward(
    prior: &Table,
    life: &OperationalLife,
    new_capacity: &Table,
    actual_years: &[i32],
) -> StepResult<Table> {
    let mut totals = BTreeMap::new();
    accumulate(prior, &mut totals)?;

    let built = new_capacity.filter_years(actual_years);
    let mut added = BTreeMap::new();
    accumulate(&built, &mut added)?;

    for ((region, tech, year), value) in added {
        if value == 0.0 {
            continue;
        }
        let lifetime = life.lifetime(&region, &tech) as i32;
        for active in year..year + lifetime {
            *totals
                .entry((region.clone(), tech.clone(), active))
                .or_insert(0.0) += value;
        }
    }

    to_table(RESIDUAL_CAPACITY, totals)
}

/// Add carried capacity onto a step's residual capacity input.
///
/// Only `years` of the carried table are used. Returns `None` when the carried
/// capacity has no row in `years`, which means there is nothing left to carry
/// for this branch.
pub fn overlay_residual(
    base: Option<&Table>,
    carried: &Table,
    years: &[i32],
) -> StepResult<Option<Table>> {
    let carried = carried.filter_years(years);
    if carried.is_empty() {
        debug!("carried capacity does not reach the modelled years");
        return Ok(None);
    }

    let mut totals = BTreeMap::new();
    if let Some(base) = base {
        accumulate(base, &mut totals)?;
    }
    accumulate(&carried, &mut totals)?;
    let merged = to_table(RESIDUAL_CAPACITY, totals)?;

    // Keep the input's column order when it differs from the canonical one.
    match base {
        Some(base) if base.index() != merged.index() => Ok(Some(reorder(&merged, base.index())?)),
        _ => Ok(Some(merged)),
    }
}

fn reorder(table: &Table, index: &[String]) -> StepResult<Table> {
    let positions: Vec<usize> = index
        .iter()
        .map(|c| {
            table
                .column_position(c)
                .ok_or_else(|| StepError::parse(format!("{RESIDUAL_CAPACITY} has unexpected column {c}")))
        })
        .collect::<StepResult<_>>()?;
    let mut out = Table::new(table.name(), index.to_vec());
    for row in table.rows() {
        let key: Vec<String> = positions.iter().map(|p| row.key[*p].clone()).collect();
        out.push(Row {
            key,
            value: Value::Number(row.value.as_f64().unwrap_or_default()),
        })?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(name: &str, rows: &[(&str, i32, f64)]) -> Table {
        let mut table = Table::new(name, capacity_index());
        for (tech, year, value) in rows {
            table
                .push(Row::new(["UTOPIA".to_string(), tech.to_string(), year.to_string()], *value))
                .unwrap();
        }
        table
    }

    fn values(table: &Table) -> Vec<(i32, f64)> {
        table
            .rows()
            .iter()
            .map(|r| (r.key[2].parse().unwrap(), r.value.as_f64().unwrap()))
            .collect()
    }

    fn e01_life() -> OperationalLife {
        let mut life = OperationalLife::new();
        life.insert("E01", 5);
        life
    }

    #[test]
    fn new_capacity_active_for_operational_life() {
        let prior = capacity(RESIDUAL_CAPACITY, &[("E01", 1995, 2.0), ("E01", 1996, 2.0), ("E01", 1997, 2.0), ("E01", 1998, 2.0), ("E01", 1999, 2.0)]);
        let new = capacity(NEW_CAPACITY, &[("E01", 1995, 1.0), ("E01", 1997, 1.0)]);
        let out = carry_forward(&prior, &e01_life(), &new, &[1995, 1996, 1997]).unwrap();
        assert_eq!(
            values(&out),
            vec![(1995, 3.0), (1996, 3.0), (1997, 4.0), (1998, 4.0), (1999, 4.0), (2000, 1.0), (2001, 1.0)]
        );
    }

    #[test]
    fn rows_outside_actual_years_are_ignored() {
        let prior = capacity(RESIDUAL_CAPACITY, &[("E01", 1995, 2.0), ("E01", 1996, 2.0), ("E01", 1997, 2.0), ("E01", 1998, 2.0), ("E01", 1999, 2.0)]);
        let new = capacity(NEW_CAPACITY, &[("E01", 1995, 1.0), ("E01", 1997, 1.0)]);
        let out = carry_forward(&prior, &e01_life(), &new, &[1995, 1996]).unwrap();
        assert!(values(&out).iter().all(|(_, v)| *v == 3.0));
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn repeated_calls_do_not_double_count() {
        let prior = capacity(RESIDUAL_CAPACITY, &[("E01", 1995, 2.0)]);
        let new = capacity(NEW_CAPACITY, &[("E01", 1995, 1.0)]);
        let once = carry_forward(&prior, &e01_life(), &new, &[1995]).unwrap();
        let twice = carry_forward(&prior, &e01_life(), &new, &[1995]).unwrap();
        assert_eq!(once, twice);
        assert_eq!(prior.len(), 1);
    }

    #[test]
    fn unknown_technology_lives_one_year() {
        let prior = Table::new(RESIDUAL_CAPACITY, capacity_index());
        let new = capacity(NEW_CAPACITY, &[("IMP", 1990, 0.3333333)]);
        let out = carry_forward(&prior, &OperationalLife::new(), &new, &[1990]).unwrap();
        assert_eq!(values(&out), vec![(1990, 0.3333)]);
    }

    #[test]
    fn overlay_adds_onto_base_within_years() {
        let base = capacity(RESIDUAL_CAPACITY, &[("E01", 2000, 1.0), ("E02", 2000, 4.0)]);
        let carried = capacity(RESIDUAL_CAPACITY, &[("E01", 1999, 5.0), ("E01", 2000, 2.0), ("E01", 2001, 2.0)]);
        let out = overlay_residual(Some(&base), &carried, &[2000, 2001]).unwrap().unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(values(&out), vec![(2000, 3.0), (2001, 2.0), (2000, 4.0)]);
        assert!(overlay_residual(Some(&base), &carried, &[2010]).unwrap().is_none());
    }

    #[test]
    fn operational_life_reads_table() {
        let mut table = Table::new(OPERATIONAL_LIFE, [REGION, TECHNOLOGY]);
        table.push(Row::new(["UTOPIA", "E01"], 30.0)).unwrap();
        let life = OperationalLife::from_table(&table).unwrap();
        assert_eq!(life.lifetime("UTOPIA", "E01"), 30);
        assert_eq!(life.lifetime("UTOPIA", "E99"), DEFAULT_LIFETIME);
        assert_eq!(life.lifetime("ATLANTIS", "E01"), DEFAULT_LIFETIME);
    }

    #[test]
    fn lifetimes_differ_by_region() {
        let mut table = Table::new(OPERATIONAL_LIFE, [REGION, TECHNOLOGY]);
        table.push(Row::new(["NORTH", "E01"], 2.0)).unwrap();
        table.push(Row::new(["SOUTH", "E01"], 4.0)).unwrap();
        let life = OperationalLife::from_table(&table).unwrap();

        let mut new = Table::new(NEW_CAPACITY, capacity_index());
        for region in ["NORTH", "SOUTH"] {
            new.push(Row::new([region, "E01", "2000"], 1.0)).unwrap();
        }
        let prior = Table::new(RESIDUAL_CAPACITY, capacity_index());
        let out = carry_forward(&prior, &life, &new, &[2000]).unwrap();

        let years_in = |region: &str| {
            out.rows()
                .iter()
                .filter(|r| r.key[0] == region)
                .map(|r| r.key[2].parse::<i32>().unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(years_in("NORTH"), vec![2000, 2001]);
        assert_eq!(years_in("SOUTH"), vec![2000, 2001, 2002, 2003]);
    }

    #[test]
    fn regional_entry_wins_over_technology_wide_one() {
        let mut life = OperationalLife::new();
        life.insert("E01", 10);
        life.insert_in("NORTH", "E01", 3);
        assert_eq!(life.lifetime("NORTH", "E01"), 3);
        assert_eq!(life.lifetime("SOUTH", "E01"), 10);

        let mut table = Table::new(OPERATIONAL_LIFE, [TECHNOLOGY]);
        table.push(Row::new(["E02"], 7.0)).unwrap();
        let life = OperationalLife::from_table(&table).unwrap();
        assert_eq!(life.lifetime("ANY", "E02"), 7);
    }
}
