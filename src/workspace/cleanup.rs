use crate::fetcher::ExtractedTree;
use crate::scanner::DocumentFile;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Extracted entries left in place because they hold a protected path.
    pub retained: Vec<PathBuf>,
    pub failures: Vec<String>,
}

/// Removes the temporary artifacts of a run. Missing paths are ignored and
/// failures are collected so one stuck file does not leave the rest behind.
pub struct WorkspaceCleaner {
    remove_sources: bool,
    remove_extracted: bool,
    remove_archive: bool,
    protected: Vec<PathBuf>,
}

impl WorkspaceCleaner {
    pub fn new() -> Self {
        Self {
            remove_sources: true,
            remove_extracted: true,
            remove_archive: true,
            protected: Vec::new(),
        }
    }

    /// Never remove an extracted entry that is, or contains, `path`.
    pub fn with_protected_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.protected.push(path.into());
        self
    }

    pub fn with_remove_sources(mut self, remove: bool) -> Self {
        self.remove_sources = remove;
        self
    }

    pub fn with_remove_extracted(mut self, remove: bool) -> Self {
        self.remove_extracted = remove;
        self
    }

    pub fn with_remove_archive(mut self, remove: bool) -> Self {
        self.remove_archive = remove;
        self
    }

    pub fn clean(
        &self,
        documents: &[DocumentFile],
        extracted: Option<&ExtractedTree>,
        archive: Option<&Path>,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();

        if self.remove_sources {
            for document in documents {
                remove_path(&document.path, &mut report);
            }
        }

        if self.remove_extracted {
            if let Some(tree) = extracted {
                for entry in &tree.top_level {
                    if self.is_protected(entry) {
                        warn!(
                            path = %entry.display(),
                            "extracted entry holds the content directory, keeping it"
                        );
                        report.retained.push(entry.clone());
                        continue;
                    }
                    remove_path(entry, &mut report);
                }
            }
        }

        if self.remove_archive {
            if let Some(archive) = archive {
                remove_path(archive, &mut report);
            }
        }

        report
    }

    fn is_protected(&self, entry: &Path) -> bool {
        self.protected.iter().any(|p| p.starts_with(entry))
    }
}

impl Default for WorkspaceCleaner {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_path(path: &Path, report: &mut CleanupReport) {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "already gone");
            return;
        }
        Err(e) => {
            report
                .failures
                .push(format!("Failed to inspect {}: {}", path.display(), e));
            return;
        }
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            report.removed.push(path.to_path_buf());
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove");
            report
                .failures
                .push(format!("Failed to remove {}: {}", path.display(), e));
        }
    }
}
