//! JSON report of accepted testimonials.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ReportError;
use crate::pipeline::types::ResultRecord;

/// Serialize records as a pretty-printed JSON array.
pub fn to_json(records: &[ResultRecord]) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Writes the report file, replacing any previous one.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, records: &[ResultRecord]) -> Result<(), ReportError> {
        let json = to_json(records)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ReportError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| ReportError::Write {
                path: self.path.clone(),
                source,
            })?;

        info!(path = %self.path.display(), count = records.len(), "Report written");
        Ok(())
    }
}
