//! Solver solution readers.
//!
//! Each supported solver writes its own solution format. This module reads
//! the feasibility status and the variable values from all of them, and turns
//! variables like `NewCapacity(UTOPIA,E01,1990)` into result tables.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use stepwise_core::{Dataset, Row, Table, Value};
use tracing::debug;

/// Native solution file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolutionFormat {
    /// `cbc ... -solu`: status line then `index name value reduced_cost`.
    Cbc,
    /// `glpsol -o`: printable report with a `Status:` header.
    Glpk,
    /// Gurobi `ResultFile=*.sol`: `name value` lines.
    Gurobi,
    /// CPLEX XML solution.
    Cplex,
}

/// A solution file together with the format it was written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSolution {
    pub path: PathBuf,
    pub format: SolutionFormat,
}

impl NativeSolution {
    pub fn new(path: impl Into<PathBuf>, format: SolutionFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unbounded,
    /// The solution file is absent or empty.
    Missing,
    Other(String),
}

impl SolutionStatus {
    /// Optimal and feasible solutions are collected; everything else fails the branch.
    pub fn is_acceptable(&self) -> bool {
        matches!(self, SolutionStatus::Optimal | SolutionStatus::Feasible)
    }

    fn from_marker(marker: &str) -> Self {
        let lower = marker.trim().to_ascii_lowercase();
        if lower.contains("infeasible") {
            SolutionStatus::Infeasible
        } else if lower.contains("unbounded") {
            SolutionStatus::Unbounded
        } else if lower.contains("non-optimal") || lower.contains("nonoptimal") {
            SolutionStatus::Other(marker.trim().to_string())
        } else if lower.contains("optimal") {
            SolutionStatus::Optimal
        } else if lower.contains("feasible") {
            SolutionStatus::Feasible
        } else {
            SolutionStatus::Other(marker.trim().to_string())
        }
    }
}

/// One variable value from a solution.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValue {
    pub name: String,
    pub indices: Vec<String>,
    pub value: f64,
}

/// Split `Name(a,b,c)` into its name and indices.
pub fn parse_variable_name(raw: &str) -> (String, Vec<String>) {
    match raw.split_once('(') {
        Some((name, rest)) => {
            let inner = rest.strip_suffix(')').unwrap_or(rest);
            let indices = inner
                .split(',')
                .map(|s| s.trim().trim_matches('\'').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            (name.to_string(), indices)
        }
        None => (raw.to_string(), Vec::new()),
    }
}

fn variable(raw_name: &str, value: f64) -> VariableValue {
    let (name, indices) = parse_variable_name(raw_name);
    VariableValue {
        name,
        indices,
        value,
    }
}

fn read_text(solution: &NativeSolution) -> Result<Option<String>> {
    if !solution.path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&solution.path)
        .with_context(|| format!("reading solution {}", solution.path.display()))?;
    Ok((!text.trim().is_empty()).then_some(text))
}

/// Read the solver's status marker.
pub fn read_status(solution: &NativeSolution) -> Result<SolutionStatus> {
    let Some(text) = read_text(solution)? else {
        return Ok(SolutionStatus::Missing);
    };
    let status = match solution.format {
        SolutionFormat::Cbc => {
            let first = text.lines().next().unwrap_or_default();
            let marker = first.split(" - ").next().unwrap_or(first);
            SolutionStatus::from_marker(marker)
        }
        SolutionFormat::Glpk => text
            .lines()
            .take(12)
            .find_map(|l| l.trim().strip_prefix("Status:"))
            .map(SolutionStatus::from_marker)
            .unwrap_or_else(|| SolutionStatus::Other("no status line".into())),
        // Gurobi only writes a result file when it has a solution.
        SolutionFormat::Gurobi => SolutionStatus::Optimal,
        SolutionFormat::Cplex => cplex_status(&text)?
            .map(|s| SolutionStatus::from_marker(&s))
            .unwrap_or_else(|| SolutionStatus::Other("no solutionStatusString".into())),
    };
    debug!(path = %solution.path.display(), ?status, "read solution status");
    Ok(status)
}

/// Read all variable values.
pub fn read_variables(solution: &NativeSolution) -> Result<Vec<VariableValue>> {
    let Some(text) = read_text(solution)? else {
        return Ok(Vec::new());
    };
    match solution.format {
        SolutionFormat::Cbc => Ok(cbc_variables(&text)),
        SolutionFormat::Glpk => Ok(glpk_variables(&text)),
        SolutionFormat::Gurobi => Ok(gurobi_variables(&text)),
        SolutionFormat::Cplex => cplex_variables(&text),
    }
}

fn cbc_variables(text: &str) -> Vec<VariableValue> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let mut tokens = line.split_whitespace().peekable();
            if tokens.peek() == Some(&"**") {
                tokens.next();
            }
            let _index = tokens.next()?;
            let name = tokens.next()?;
            let value: f64 = tokens.next()?.parse().ok()?;
            Some(variable(name, value))
        })
        .collect()
}

fn glpk_variables(text: &str) -> Vec<VariableValue> {
    let mut lines = text.lines().skip_while(|l| !l.contains("Column name"));
    // Column header and its dashed rule.
    lines.next();
    lines.next();

    let mut out = Vec::new();
    let mut pending: Option<String> = None;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("Karush") || trimmed.starts_with("End of") {
            break;
        }
        let mut tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let name = match pending.take() {
            Some(name) => name,
            None => {
                if tokens.len() < 2 || tokens[0].parse::<usize>().is_err() {
                    continue;
                }
                let name = tokens[1].to_string();
                tokens.drain(..2);
                if tokens.is_empty() {
                    // Long names wrap onto the next line.
                    pending = Some(name);
                    continue;
                }
                name
            }
        };
        if let Some(value) = tokens.iter().find_map(|t| t.parse::<f64>().ok()) {
            out.push(variable(&name, value));
        }
    }
    out
}

fn gurobi_variables(text: &str) -> Vec<VariableValue> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let (name, value) = line.rsplit_once(char::is_whitespace)?;
            Some(variable(name.trim(), value.parse().ok()?))
        })
        .collect()
}

fn attribute_value(event: &BytesStart, key: &str) -> Result<Option<String>> {
    for attr in event.attributes().with_checks(false) {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn cplex_status(text: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    loop {
        match reader.read_event().context("parsing CPLEX solution")? {
            Event::Start(ref e) | Event::Empty(ref e) if e.name().as_ref() == b"header" => {
                return attribute_value(e, "solutionStatusString");
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn cplex_variables(text: &str) -> Result<Vec<VariableValue>> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    let mut out = Vec::new();
    loop {
        match reader.read_event().context("parsing CPLEX solution")? {
            Event::Start(ref e) | Event::Empty(ref e) if e.name().as_ref() == b"variable" => {
                let name = attribute_value(e, "name")?;
                let value = attribute_value(e, "value")?;
                if let (Some(name), Some(value)) = (name, value) {
                    let value: f64 = value
                        .parse()
                        .with_context(|| format!("CPLEX value '{value}' for {name}"))?;
                    out.push(variable(&name, value));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Index column names for result variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSchema(HashMap<String, Vec<String>>);

const OSEMOSYS_RESULTS: &[(&str, &[&str])] = &[
    ("AccumulatedNewCapacity", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("AnnualEmissions", &["REGION", "EMISSION", "YEAR"]),
    ("AnnualFixedOperatingCost", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("AnnualTechnologyEmission", &["REGION", "TECHNOLOGY", "EMISSION", "YEAR"]),
    ("AnnualVariableOperatingCost", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("CapitalInvestment", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("Demand", &["REGION", "TIMESLICE", "FUEL", "YEAR"]),
    ("DiscountedSalvageValue", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("NewCapacity", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("NumberOfNewTechnologyUnits", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("ProductionByTechnology", &["REGION", "TIMESLICE", "TECHNOLOGY", "FUEL", "YEAR"]),
    ("ProductionByTechnologyAnnual", &["REGION", "TECHNOLOGY", "FUEL", "YEAR"]),
    ("RateOfActivity", &["REGION", "TIMESLICE", "TECHNOLOGY", "MODE_OF_OPERATION", "YEAR"]),
    ("SalvageValue", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("TotalCapacityAnnual", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("TotalDiscountedCost", &["REGION", "YEAR"]),
    ("TotalTechnologyAnnualActivity", &["REGION", "TECHNOLOGY", "YEAR"]),
    ("TotalTechnologyModelPeriodActivity", &["REGION", "TECHNOLOGY"]),
    ("Trade", &["REGION", "_REGION", "TIMESLICE", "FUEL", "YEAR"]),
    ("UseByTechnology", &["REGION", "TIMESLICE", "TECHNOLOGY", "FUEL", "YEAR"]),
];

impl Default for ResultSchema {
    fn default() -> Self {
        Self(
            OSEMOSYS_RESULTS
                .iter()
                .map(|(name, cols)| (name.to_string(), cols.iter().map(|c| c.to_string()).collect()))
                .collect(),
        )
    }
}

impl ResultSchema {
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Add or replace entries.
    pub fn extend(&mut self, other: &ResultSchema) {
        self.0.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn insert(&mut self, variable: impl Into<String>, columns: Vec<String>) {
        self.0.insert(variable.into(), columns);
    }

    /// Column names for `variable` with `arity` indices.
    ///
    /// Uses the schema entry when its arity matches; otherwise names each
    /// position after the reference set containing `sample[i]`, falling back
    /// to `INDEX<i>`. Repeated set names get a leading underscore, as in
    /// `REGION, _REGION`.
    pub fn columns_for(
        &self,
        variable: &str,
        sample: &[String],
        reference: Option<&Dataset>,
    ) -> Vec<String> {
        if let Some(cols) = self.0.get(variable).filter(|c| c.len() == sample.len()) {
            return cols.clone();
        }
        let mut columns: Vec<String> = Vec::with_capacity(sample.len());
        for (pos, member) in sample.iter().enumerate() {
            let base = reference
                .and_then(|r| r.set_containing(member))
                .map(str::to_string)
                .unwrap_or_else(|| format!("INDEX{pos}"));
            let mut name = base.clone();
            while columns.contains(&name) {
                name = format!("_{name}");
            }
            columns.push(name);
        }
        columns
    }

    /// Group variables into one table per variable name.
    pub fn tabulate(
        &self,
        variables: &[VariableValue],
        reference: Option<&Dataset>,
    ) -> Result<Dataset> {
        let mut grouped: BTreeMap<&str, Vec<&VariableValue>> = BTreeMap::new();
        for var in variables.iter().filter(|v| !v.indices.is_empty()) {
            grouped.entry(var.name.as_str()).or_default().push(var);
        }

        let mut dataset = Dataset::new();
        for (name, vars) in grouped {
            let columns = self.columns_for(name, &vars[0].indices, reference);
            let mut table = Table::new(name, columns);
            for var in vars {
                table
                    .push(Row {
                        key: var.indices.clone(),
                        value: Value::Number(var.value),
                    })
                    .with_context(|| format!("variable {name} has inconsistent indices"))?;
            }
            table.dedup_keep_last();
            table.sort();
            dataset.insert(table);
        }
        Ok(dataset)
    }
}

/// Solution file written into a branch's workspace by every solver.
pub const SOLUTION_FILE: &str = "model.sol";

pub fn solution_path(dir: &Path) -> PathBuf {
    dir.join(SOLUTION_FILE)
}
