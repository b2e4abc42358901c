use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One branch run (or pruning) recorded in the run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRecord {
    pub step: usize,
    pub branch: String,
    /// `ok`, `failed` or `pruned`.
    pub status: String,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub num_steps: usize,
    pub scenarios: Vec<String>,
    pub success: usize,
    pub failure: usize,
    pub pruned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub branches: Vec<BranchRecord>,
}

pub fn write_run_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(manifest).context("serializing run manifest to JSON")?;
    fs::write(path, json).with_context(|| format!("writing run manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_run_manifest(path: &Path) -> Result<RunManifest> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening run manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing run manifest '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn manifest_writes_and_reads_back() {
        let record = BranchRecord {
            step: 1,
            branch: "1A0".into(),
            status: "failed".into(),
            stage: "built".into(),
            kind: Some("infeasible_or_unsolved".into()),
            error: Some("glpsol reported Infeasible".into()),
            elapsed_ms: 42,
        };
        let manifest = RunManifest {
            created_at: Utc::now(),
            finished_at: Utc::now(),
            num_steps: 2,
            scenarios: vec!["1A1".into()],
            success: 2,
            failure: 1,
            pruned: 0,
            error: None,
            branches: vec![record],
        };
        let tmp = NamedTempFile::new().unwrap();
        write_run_manifest(tmp.path(), &manifest).unwrap();
        let text = fs::read_to_string(tmp.path()).unwrap();
        assert!(!text.contains("\"error\": null"));
        let parsed = load_run_manifest(tmp.path()).unwrap();
        assert_eq!(parsed.failure, 1);
        assert_eq!(parsed.branches[0].branch, "1A0");
        assert_eq!(parsed.branches[0].kind.as_deref(), Some("infeasible_or_unsolved"));
    }
}
