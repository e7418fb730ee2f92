pub mod cleanup;
pub mod run_report;

pub use cleanup::{CleanupReport, WorkspaceCleaner};
pub use run_report::{PipelineStage, RunReport};

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Anchor a relative path at the process's current directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
