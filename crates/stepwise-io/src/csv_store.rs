//! CSV row store: one file per table, one directory per dataset.
//!
//! Every file has a header row whose last column is `VALUE`; all other
//! columns are index columns. A file with only `VALUE` is a set.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use stepwise_core::{Dataset, Row, Table, Value, VALUE};
use tracing::debug;

/// Read one table; its name is the file stem.
pub fn read_table(path: &Path) -> Result<Table> {
    let name = table_name(path)?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening table {}", path.display()))?;

    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    let value_pos = match headers.iter().position(|h| h == VALUE) {
        Some(pos) if pos + 1 == headers.len() => pos,
        Some(_) => bail!("{}: {VALUE} must be the last column", path.display()),
        None => bail!("{}: missing {VALUE} column", path.display()),
    };

    let mut table = Table::new(name, headers[..value_pos].iter().cloned());
    for (line, record) in rdr.records().enumerate() {
        let record =
            record.with_context(|| format!("parsing {} record {}", path.display(), line + 1))?;
        let key: Vec<String> = record.iter().take(value_pos).map(str::to_string).collect();
        let value = Value::parse(record.get(value_pos).unwrap_or_default());
        table
            .push(Row { key, value })
            .with_context(|| format!("{} record {}", path.display(), line + 1))?;
    }
    Ok(table)
}

/// Write one table with its index columns followed by `VALUE`.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating CSV writer for {}", path.display()))?;

    let mut header: Vec<&str> = table.index().iter().map(String::as_str).collect();
    header.push(VALUE);
    wtr.write_record(&header).context("writing CSV header")?;

    for row in table.rows() {
        let mut record: Vec<String> = row.key.clone();
        record.push(row.value.to_string());
        wtr.write_record(&record).context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}

/// CSV files directly under `dir`, sorted by name.
pub fn table_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    Ok(files)
}

pub fn read_dataset(dir: &Path) -> Result<Dataset> {
    let mut dataset = Dataset::new();
    for path in table_files(dir)? {
        dataset.insert(read_table(&path)?);
    }
    debug!(dir = %dir.display(), tables = dataset.len(), "read dataset");
    Ok(dataset)
}

/// Write every table as `<dir>/<name>.csv`, creating `dir` if needed.
pub fn write_dataset(dataset: &Dataset, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for table in dataset.tables() {
        write_table(table, &dir.join(format!("{}.csv", table.name())))?;
    }
    Ok(())
}

fn table_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}
