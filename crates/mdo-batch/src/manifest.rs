use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::recorder::CaseRecord;

/// Everything a sweep recorded, ordered by case index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepManifest {
    pub created_at: DateTime<Utc>,
    pub driver: String,
    pub generator: String,
    pub workers: usize,
    pub num_cases: usize,
    pub success: usize,
    pub failure: usize,
    /// True when some worker stopped early on an unexpected failure.
    pub terminated: bool,
    pub cases: Vec<CaseRecord>,
}

impl SweepManifest {
    pub fn from_records(
        driver: &str,
        generator: &str,
        workers: usize,
        mut cases: Vec<CaseRecord>,
    ) -> Self {
        cases.sort_by_key(|record| record.case_index);
        let success = cases.iter().filter(|r| r.metadata.success).count();
        Self {
            created_at: Utc::now(),
            driver: driver.to_string(),
            generator: generator.to_string(),
            workers,
            num_cases: cases.len(),
            success,
            failure: cases.len() - success,
            terminated: cases.iter().any(|r| r.metadata.terminate),
            cases,
        }
    }
}

pub fn write_sweep_manifest(path: &Path, manifest: &SweepManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(manifest).context("serializing sweep manifest to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("writing sweep manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_sweep_manifest(path: &Path) -> Result<SweepManifest> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening sweep manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing sweep manifest '{}'", path.display()))
}
