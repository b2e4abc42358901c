//! Tabular row store for model input and results.
//!
//! Every parameter, set and result is a [`Table`]: a list of index columns and
//! rows of `(key, value)`. Sets have no index columns and store their members
//! in the value. A [`Dataset`] is a named collection of tables, i.e. the
//! content of one CSV directory.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{StepError, StepResult};

/// Name of the value column in every table.
pub const VALUE: &str = "VALUE";
/// Name of the year index column.
pub const YEAR: &str = "YEAR";

/// A table cell in the value column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(number) if !trimmed.is_empty() => Value::Number(number),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Text(text) => text.parse().ok(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::parse(value)
    }
}

/// One row: index values aligned with [`Table::index`] plus the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: Vec<String>,
    pub value: Value,
}

impl Row {
    pub fn new<K, S>(key: K, value: impl Into<Value>) -> Self
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into_iter().map(Into::into).collect(),
            value: value.into(),
        }
    }
}

/// A named table with index columns and one value column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    index: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new<I, S>(name: impl Into<String>, index: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            index: index.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Empty set table (value column only).
    pub fn set(name: impl Into<String>) -> Self {
        Self::new(name, Vec::<String>::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A set has no index columns; its members live in the value column.
    pub fn is_set(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.index.iter().position(|c| c == column)
    }

    pub fn has_year(&self) -> bool {
        self.column_position(YEAR).is_some()
    }

    pub fn push(&mut self, row: Row) -> StepResult<()> {
        if row.key.len() != self.index.len() {
            return Err(StepError::parse(format!(
                "row for table '{}' has {} index values, expected {}",
                self.name,
                row.key.len(),
                self.index.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn get(&self, key: &[String]) -> Option<&Value> {
        self.rows
            .iter()
            .rev()
            .find(|row| row.key == key)
            .map(|row| &row.value)
    }

    /// Overwrite the row with the same key, or append it.
    pub fn upsert(&mut self, row: Row) -> StepResult<()> {
        if let Some(existing) = self.rows.iter_mut().find(|r| r.key == row.key) {
            existing.value = row.value;
            return Ok(());
        }
        self.push(row)
    }

    /// Upsert many rows at once through a key index.
    ///
    /// Later rows win over earlier ones and over existing rows with the same
    /// key. Existing rows keep their position; new keys are appended.
    pub fn upsert_all(&mut self, rows: impl IntoIterator<Item = Row>) -> StepResult<()> {
        let mut positions: HashMap<Vec<String>, usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(pos, row)| (row.key.clone(), pos))
            .collect();
        for row in rows {
            match positions.get(&row.key) {
                Some(&pos) => self.rows[pos].value = row.value,
                None => {
                    positions.insert(row.key.clone(), self.rows.len());
                    self.push(row)?;
                }
            }
        }
        Ok(())
    }

    /// Year of a row, if this table has a YEAR column (or is the YEAR set).
    pub fn row_year(&self, row: &Row) -> Option<i32> {
        match self.column_position(YEAR) {
            Some(pos) => row.key[pos].trim().parse().ok(),
            None if self.is_set() && self.name == YEAR => {
                row.value.as_f64().map(|v| v as i32)
            }
            None => None,
        }
    }

    /// True for year-indexed tables and for the YEAR set itself.
    pub fn is_year_indexed(&self) -> bool {
        self.has_year() || (self.is_set() && self.name == YEAR)
    }

    /// Keep only rows in `years`. Tables without a year dimension are cloned.
    pub fn filter_years(&self, years: &[i32]) -> Table {
        if !self.is_year_indexed() {
            return self.clone();
        }
        let rows = self
            .rows
            .iter()
            .filter(|row| self.row_year(row).is_some_and(|y| years.contains(&y)))
            .cloned()
            .collect();
        Table {
            name: self.name.clone(),
            index: self.index.clone(),
            rows,
        }
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Row) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    /// Drop rows with duplicate keys, keeping the last occurrence in the
    /// position of the first.
    pub fn dedup_keep_last(&mut self) {
        let mut positions: HashMap<Vec<String>, usize> = HashMap::new();
        let mut deduped: Vec<Row> = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            match positions.get(&row.key) {
                Some(&pos) => deduped[pos].value = row.value,
                None => {
                    positions.insert(row.key.clone(), deduped.len());
                    deduped.push(row);
                }
            }
        }
        self.rows = deduped;
    }

    /// Sort rows by key, comparing numeric key parts numerically.
    pub fn sort(&mut self) {
        if self.is_set() {
            self.rows
                .sort_by(|a, b| compare_cells(&a.value.to_string(), &b.value.to_string()));
        } else {
            self.rows.sort_by(|a, b| compare_keys(&a.key, &b.key));
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn compare_keys(a: &[String], b: &[String]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| compare_cells(x, y))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Named collection of tables (one CSV directory).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    tables: BTreeMap<String, Table>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: Table) -> Option<Table> {
        self.tables.insert(table.name().to_string(), table)
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Members of the YEAR set.
    pub fn years(&self) -> StepResult<Vec<i32>> {
        let table = self
            .get(YEAR)
            .ok_or_else(|| StepError::config("dataset has no YEAR set"))?;
        table
            .rows()
            .iter()
            .map(|row| {
                row.value
                    .as_f64()
                    .map(|v| v as i32)
                    .ok_or_else(|| StepError::parse(format!("YEAR member '{}' is not a year", row.value)))
            })
            .collect()
    }

    /// Restrict every year-indexed table to `years`.
    pub fn filter_years(&self, years: &[i32]) -> Dataset {
        Dataset {
            tables: self
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), table.filter_years(years)))
                .collect(),
        }
    }

    /// Set membership lookup used when naming anonymous index positions.
    pub fn set_containing(&self, member: &str) -> Option<&str> {
        self.tables
            .values()
            .filter(|t| t.is_set())
            .find(|t| t.rows().iter().any(|r| r.value.to_string() == member))
            .map(Table::name)
    }
}

impl FromIterator<Table> for Dataset {
    fn from_iter<T: IntoIterator<Item = Table>>(iter: T) -> Self {
        let mut dataset = Dataset::new();
        for table in iter {
            dataset.insert(table);
        }
        dataset
    }
}
