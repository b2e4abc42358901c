//! Decisions and their option rows.
//!
//! A decision is one axis of discrete choices declared for a step, e.g.
//! decision `A` with options `0` and `1`. Each option carries parameter rows
//! that override the step's reference data. Rows with an explicit year set a
//! value directly; rows without a year carry a [`ChangeRule`] that is resolved
//! against the branch's value in the year before the step.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StepError, StepResult};
use crate::table::{Table, Value, YEAR};

/// Column naming the option within a decision table.
pub const OPTION: &str = "OPTION";
/// Column naming the overridden parameter within a decision table.
pub const PARAMETER: &str = "PARAMETER";

/// One choice of one decision, e.g. `A0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptionId {
    pub decision: String,
    pub value: String,
}

impl OptionId {
    pub fn new(decision: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            decision: decision.into(),
            value: value.into(),
        }
    }

    pub fn label(&self) -> String {
        format!("{}{}", self.decision, self.value)
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.decision, self.value)
    }
}

/// Rule for option rows without a year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChangeRule {
    /// Compound annual growth, `0.05` for `5%`.
    Growth(f64),
    /// Absolute annual change, floored at zero.
    Absolute(f64),
}

impl ChangeRule {
    pub fn parse(raw: &str) -> StepResult<Self> {
        let raw = raw.trim();
        if let Some(rate) = raw.strip_suffix('%') {
            let rate: f64 = rate.trim().parse().map_err(|_| {
                StepError::config(format!("invalid growth rate '{raw}'"))
            })?;
            return Ok(ChangeRule::Growth(rate / 100.0));
        }
        raw.parse()
            .map(ChangeRule::Absolute)
            .map_err(|_| StepError::config(format!("invalid annual change '{raw}'")))
    }

    /// Value in `year`, given `base` in `base_year`.
    pub fn evaluate(&self, base: f64, base_year: i32, year: i32) -> f64 {
        let elapsed = f64::from(year - base_year);
        match *self {
            ChangeRule::Growth(rate) => base * (1.0 + rate).powf(elapsed),
            ChangeRule::Absolute(change) => (base + change * elapsed).max(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Fixed(Value),
    Rule(ChangeRule),
}

/// One override row of an option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionRow {
    pub option: OptionId,
    pub parameter: String,
    /// Non-year index columns and their values, e.g. `REGION = UTOPIA`.
    pub columns: BTreeMap<String, String>,
    pub year: Option<i32>,
    pub value: OptionValue,
}

impl OptionRow {
    /// Key of this row laid out for `index`, with `year` in the YEAR slot.
    pub fn key_for(&self, index: &[String], year: Option<i32>) -> StepResult<Vec<String>> {
        index
            .iter()
            .map(|column| {
                if column == YEAR {
                    year.map(|y| y.to_string()).ok_or_else(|| {
                        StepError::config(format!(
                            "option {} row for {} has no year",
                            self.option, self.parameter
                        ))
                    })
                } else {
                    self.columns.get(column).cloned().ok_or_else(|| {
                        StepError::config(format!(
                            "option {} row for {} is missing column {column}",
                            self.option, self.parameter
                        ))
                    })
                }
            })
            .collect()
    }
}

/// A decision axis declared at one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub name: String,
    pub step: usize,
    /// Options in first-seen order.
    pub options: Vec<OptionId>,
    pub rows: Vec<OptionRow>,
}

impl Decision {
    /// Parse a decision table with columns `OPTION, PARAMETER, <index...>, VALUE`.
    pub fn from_table(name: &str, step: usize, table: &Table) -> StepResult<Self> {
        let option_pos = table.column_position(OPTION).ok_or_else(|| {
            StepError::config(format!("decision {name} at step {step} has no {OPTION} column"))
        })?;
        let parameter_pos = table.column_position(PARAMETER).ok_or_else(|| {
            StepError::config(format!(
                "decision {name} at step {step} has no {PARAMETER} column"
            ))
        })?;
        let year_pos = table.column_position(YEAR);

        let mut options: Vec<OptionId> = Vec::new();
        let mut rows = Vec::with_capacity(table.len());
        for row in table.rows() {
            let option = OptionId::new(name, row.key[option_pos].trim());
            if option.value.is_empty() {
                return Err(StepError::config(format!(
                    "decision {name} at step {step} has a row without an option"
                )));
            }
            if !options.contains(&option) {
                options.push(option.clone());
            }

            let columns = table
                .index()
                .iter()
                .enumerate()
                .filter(|(pos, _)| {
                    *pos != option_pos && *pos != parameter_pos && Some(*pos) != year_pos
                })
                .filter(|(pos, _)| !row.key[*pos].trim().is_empty())
                .map(|(pos, column)| (column.clone(), row.key[pos].trim().to_string()))
                .collect();

            let year = match year_pos.map(|pos| row.key[pos].trim()) {
                None | Some("") => None,
                Some(raw) => Some(raw.parse::<f64>().map(|y| y as i32).map_err(|_| {
                    StepError::config(format!("decision {name}: invalid year '{raw}'"))
                })?),
            };

            let value = match year {
                Some(_) => OptionValue::Fixed(row.value.clone()),
                None => OptionValue::Rule(ChangeRule::parse(&row.value.to_string())?),
            };

            if value_is_rule_at_first_step(&value, step) {
                return Err(StepError::config(format!(
                    "decision {name} uses a change rule at step 0; rules need a prior step"
                )));
            }

            rows.push(OptionRow {
                option,
                parameter: row.key[parameter_pos].trim().to_string(),
                columns,
                year,
                value,
            });
        }

        if options.is_empty() {
            return Err(StepError::config(format!(
                "decision {name} at step {step} declares no options"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            step,
            options,
            rows,
        })
    }

    pub fn rows_for<'a>(&'a self, option: &'a OptionId) -> impl Iterator<Item = &'a OptionRow> + 'a {
        self.rows.iter().filter(move |row| &row.option == option)
    }
}

fn value_is_rule_at_first_step(value: &OptionValue, step: usize) -> bool {
    step == 0 && matches!(value, OptionValue::Rule(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Row;

    fn decision_table() -> Table {
        let mut table = Table::new("A", [OPTION, PARAMETER, "REGION", "TECHNOLOGY", YEAR]);
        table
            .push(Row::new(["0", "TotalAnnualMaxCapacity", "UTOPIA", "E01", "1995"], 1.0))
            .unwrap();
        table
            .push(Row::new(["1", "TotalAnnualMaxCapacity", "UTOPIA", "E01", ""], "5%"))
            .unwrap();
        table
            .push(Row::new(["1", "CapitalCost", "UTOPIA", "E01", ""], "-2"))
            .unwrap();
        table
    }

    #[test]
    fn parses_options_in_first_seen_order() {
        let decision = Decision::from_table("A", 1, &decision_table()).unwrap();
        assert_eq!(decision.options, vec![OptionId::new("A", "0"), OptionId::new("A", "1")]);
        assert_eq!(decision.options[1].label(), "A1");
        let option_one: Vec<_> = decision.rows_for(&decision.options[1]).collect();
        assert_eq!(option_one.len(), 2);
        assert_eq!(option_one[0].value, OptionValue::Rule(ChangeRule::Growth(0.05)));
        assert_eq!(option_one[1].value, OptionValue::Rule(ChangeRule::Absolute(-2.0)));
        assert_eq!(decision.rows[0].year, Some(1995));
    }

    #[test]
    fn change_rule_at_step_zero_is_rejected() {
        let err = Decision::from_table("A", 0, &decision_table()).unwrap_err();
        assert!(matches!(err, StepError::Configuration(_)));
    }

    #[test]
    fn missing_option_column_is_configuration_error() {
        let table = Table::new("A", [PARAMETER, YEAR]);
        assert!(matches!(
            Decision::from_table("A", 1, &table),
            Err(StepError::Configuration(_))
        ));
    }

    #[test]
    fn change_rules_evaluate_against_base_year() {
        let growth = ChangeRule::parse("10%").unwrap();
        assert!((growth.evaluate(100.0, 1994, 1996) - 121.0).abs() < 1e-9);
        let decline = ChangeRule::parse("-30").unwrap();
        assert_eq!(decline.evaluate(50.0, 1994, 1995), 20.0);
        assert_eq!(decline.evaluate(50.0, 1994, 1996), 0.0);
        assert!(ChangeRule::parse("fast").is_err());
    }

    #[test]
    fn key_for_lays_out_columns() {
        let decision = Decision::from_table("A", 1, &decision_table()).unwrap();
        let index: Vec<String> = ["REGION", "TECHNOLOGY", YEAR].iter().map(|s| s.to_string()).collect();
        let key = decision.rows[1].key_for(&index, Some(1997)).unwrap();
        assert_eq!(key, vec!["UTOPIA", "E01", "1997"]);
        let bad: Vec<String> = vec!["MODE_OF_OPERATION".into()];
        assert!(decision.rows[1].key_for(&bad, None).is_err());
    }
}
