//! GNU MathProg datafile writer and reader.
//!
//! The writer emits sets first, then parameters in plain record form:
//!
//! ```text
//! set YEAR := 1990 1991 ;
//! # index CapitalCost: REGION,TECHNOLOGY,YEAR
//! param CapitalCost default 0 :=
//! UTOPIA E01 1990 1400
//! ;
//! end;
//! ```
//!
//! The `# index` comment is ignored by `glpsol` and lets [`read_datafile`]
//! recover column names.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use stepwise_core::{Dataset, Row, Table, Value};

const INDEX_MARKER: &str = "# index ";

/// Default values written into `param ... default` clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamDefaults(HashMap<String, f64>);

impl ParamDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, param: impl Into<String>, value: f64) -> Self {
        self.0.insert(param.into(), value);
        self
    }

    pub fn get(&self, param: &str) -> f64 {
        self.0.get(param).copied().unwrap_or(0.0)
    }

    pub fn extend(&mut self, other: &ParamDefaults) {
        self.0.extend(other.0.iter().map(|(k, v)| (k.clone(), *v)));
    }
}

fn symbol(raw: &str) -> String {
    let plain = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'));
    if plain {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', "''"))
    }
}

/// Render `dataset` as MathProg data.
pub fn render_datafile(dataset: &Dataset, defaults: &ParamDefaults) -> String {
    let mut out = String::new();
    for table in dataset.tables().filter(|t| t.is_set()) {
        let members: Vec<String> = table
            .rows()
            .iter()
            .map(|r| symbol(&r.value.to_string()))
            .collect();
        let _ = writeln!(out, "set {} := {} ;", table.name(), members.join(" "));
    }
    for table in dataset.tables().filter(|t| !t.is_set()) {
        let _ = writeln!(out, "{INDEX_MARKER}{}: {}", table.name(), table.index().join(","));
        let _ = writeln!(
            out,
            "param {} default {} :=",
            table.name(),
            defaults.get(table.name())
        );
        for row in table.rows() {
            let key: Vec<String> = row.key.iter().map(|k| symbol(k)).collect();
            let _ = writeln!(out, "{} {}", key.join(" "), row.value);
        }
        out.push_str(";\n");
    }
    out.push_str("end;\n");
    out
}

pub fn write_datafile(dataset: &Dataset, defaults: &ParamDefaults, path: &Path) -> Result<()> {
    fs::write(path, render_datafile(dataset, defaults))
        .with_context(|| format!("writing datafile {}", path.display()))
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '\'' | '"' => {
                let quote = c;
                let mut token = String::new();
                while let Some(next) = chars.next() {
                    if next == quote {
                        if chars.peek() == Some(&quote) {
                            token.push(quote);
                            chars.next();
                        } else {
                            break;
                        }
                    } else {
                        token.push(next);
                    }
                }
                tokens.push(token);
            }
            ';' => tokens.push(";".into()),
            _ => {
                let mut token = String::from(c);
                while let Some(next) = chars.peek() {
                    if next.is_whitespace() || *next == ';' {
                        break;
                    }
                    token.push(*next);
                    chars.next();
                }
                tokens.push(token);
            }
        }
    }
    tokens
}

/// Parse data written by [`render_datafile`]. Returns the tables and the
/// parameter defaults.
pub fn parse_datafile(text: &str) -> Result<(Dataset, ParamDefaults)> {
    let mut columns: HashMap<String, Vec<String>> = HashMap::new();
    let mut body = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(INDEX_MARKER) {
            if let Some((name, cols)) = rest.split_once(':') {
                let cols = cols
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                columns.insert(name.trim().to_string(), cols);
            }
            continue;
        }
        let code = trimmed.split('#').next().unwrap_or_default();
        body.push_str(code);
        body.push('\n');
    }

    let tokens = tokenize(&body);
    let mut dataset = Dataset::new();
    let mut defaults = ParamDefaults::new();
    let mut pos = 0;
    while pos < tokens.len() {
        match tokens[pos].as_str() {
            "set" => {
                let name = tokens.get(pos + 1).context("set without a name")?.clone();
                if tokens.get(pos + 2).map(String::as_str) != Some(":=") {
                    bail!("set {name}: expected ':='");
                }
                pos += 3;
                let mut table = Table::set(name);
                while pos < tokens.len() && tokens[pos] != ";" {
                    table.push(Row::new(Vec::<String>::new(), Value::parse(&tokens[pos])))?;
                    pos += 1;
                }
                dataset.insert(table);
                pos += 1;
            }
            "param" => {
                let name = tokens.get(pos + 1).context("param without a name")?.clone();
                pos += 2;
                if tokens.get(pos).map(String::as_str) == Some("default") {
                    let raw = tokens.get(pos + 1).context("default without a value")?;
                    let value: f64 = raw
                        .parse()
                        .with_context(|| format!("param {name}: bad default '{raw}'"))?;
                    defaults = defaults.with(name.clone(), value);
                    pos += 2;
                }
                if tokens.get(pos).map(String::as_str) != Some(":=") {
                    bail!("param {name}: expected ':='");
                }
                pos += 1;
                let mut values = Vec::new();
                while pos < tokens.len() && tokens[pos] != ";" {
                    values.push(tokens[pos].clone());
                    pos += 1;
                }
                pos += 1;
                let index = columns
                    .get(&name)
                    .cloned()
                    .with_context(|| format!("param {name} has no index comment"))?;
                dataset.insert(param_table(&name, index, &values)?);
            }
            "end" => break,
            other => bail!("unexpected token '{other}' in datafile"),
        }
    }
    Ok((dataset, defaults))
}

fn param_table(name: &str, index: Vec<String>, values: &[String]) -> Result<Table> {
    let width = index.len() + 1;
    if values.len() % width != 0 {
        bail!(
            "param {name}: {} tokens do not form records of {width}",
            values.len()
        );
    }
    let mut table = Table::new(name, index);
    for record in values.chunks(width) {
        let (key, value) = record.split_at(width - 1);
        table.push(Row {
            key: key.to_vec(),
            value: Value::parse(&value[0]),
        })?;
    }
    Ok(table)
}

pub fn read_datafile(path: &Path) -> Result<(Dataset, ParamDefaults)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading datafile {}", path.display()))?;
    parse_datafile(&text).with_context(|| format!("parsing datafile {}", path.display()))
}
