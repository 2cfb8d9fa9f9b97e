//! Per-stage JSON artifacts.
//!
//! Each completed stage writes `{folder}_{stage}_results.json` into the
//! results directory, pretty-printed and overwritten on every run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, folder_id: &str, stage: &str) -> PathBuf {
        self.dir.join(format!("{}_{}_results.json", folder_id, stage))
    }

    pub fn write<T: Serialize>(&self, folder_id: &str, stage: &str, value: &T) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create results directory: {}", self.dir.display())
        })?;
        let path = self.path_for(folder_id, stage);
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
        Ok(path)
    }
}
