use crate::error::{LectureSyncError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fetched,
    Extracted,
    Merged,
    Rewritten,
    Converted,
    CleanedUp,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Fetched => "fetched",
            PipelineStage::Extracted => "extracted",
            PipelineStage::Merged => "merged",
            PipelineStage::Rewritten => "rewritten",
            PipelineStage::Converted => "converted",
            PipelineStage::CleanedUp => "cleaned up",
        };
        f.write_str(name)
    }
}

/// Everything one pipeline run did, in a form that serializes to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub url: String,
    pub archive_path: Option<PathBuf>,
    pub fetch_skipped: bool,
    pub bytes_downloaded: u64,
    pub extracted_root: Option<PathBuf>,
    pub files_extracted: usize,
    pub content_directory: PathBuf,
    pub files_merged: usize,
    pub documents_found: usize,
    pub documents_rewritten: usize,
    pub lines_rewritten: usize,
    pub converter_exit_code: Option<i32>,
    pub notebooks: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub stages: Vec<PipelineStage>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl RunReport {
    pub fn new<S: Into<String>>(url: S, content_directory: PathBuf) -> Self {
        Self {
            url: url.into(),
            archive_path: None,
            fetch_skipped: false,
            bytes_downloaded: 0,
            extracted_root: None,
            files_extracted: 0,
            content_directory,
            files_merged: 0,
            documents_found: 0,
            documents_rewritten: 0,
            lines_rewritten: 0,
            converter_exit_code: None,
            notebooks: Vec::new(),
            removed: Vec::new(),
            warnings: Vec::new(),
            stages: Vec::new(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    pub fn complete_stage(&mut self, stage: PipelineStage) {
        self.stages.push(stage);
    }

    pub fn add_warning<S: Into<String>>(&mut self, warning: S) {
        self.warnings.push(warning.into());
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LectureSyncError::Config {
            message: format!("Failed to serialize report to JSON: {}", e),
        })
    }
}
