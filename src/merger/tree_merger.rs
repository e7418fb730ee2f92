use crate::error::{LectureSyncError, Result};
use crate::scanner::FileFilter;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct MergeProgress {
    pub files_copied: usize,
    pub total_files: usize,
    pub bytes_copied: u64,
    pub files_skipped: usize,
    pub current_file: Option<String>,
    pub start_time: Instant,
    pub errors: Vec<String>,
}

impl MergeProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            files_copied: 0,
            total_files,
            bytes_copied: 0,
            files_skipped: 0,
            current_file: None,
            start_time: Instant::now(),
            errors: Vec::new(),
        }
    }

    pub fn update_file(&mut self, relative_path: String, bytes: u64) {
        self.files_copied += 1;
        self.bytes_copied += bytes;
        self.current_file = Some(relative_path);
    }

    pub fn add_error<S: Into<String>>(&mut self, error: S) {
        self.errors.push(error.into());
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Recursively copies a source tree over a destination; same-named files are overwritten.
pub struct TreeMerger {
    filter: FileFilter,
    buffer_size: usize,
}

impl TreeMerger {
    pub fn new() -> Self {
        Self {
            filter: FileFilter::default(),
            buffer_size: 64 * 1024, // 64KB buffer
        }
    }

    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Self {
        self.filter = self.filter.with_exclude_patterns(patterns);
        self
    }

    pub fn merge(
        &self,
        source: &Path,
        destination: &Path,
        progress_callback: Option<&dyn Fn(&MergeProgress)>,
    ) -> Result<MergeProgress> {
        if !source.is_dir() {
            return Err(LectureSyncError::MissingSource {
                path: source.to_path_buf(),
            });
        }

        let files = self.collect_files(source)?;
        let mut progress = MergeProgress::new(files.len());

        fs::create_dir_all(destination)?;

        for relative in files {
            if self.filter.is_excluded(&relative) {
                debug!(path = %relative.display(), "excluded from merge");
                progress.files_skipped += 1;
                continue;
            }

            if let Some(callback) = progress_callback {
                callback(&progress);
            }

            let src = source.join(&relative);
            let dest = destination.join(&relative);

            match self.copy_file(&src, &dest) {
                Ok(bytes) => progress.update_file(relative.display().to_string(), bytes),
                Err(e) => {
                    warn!(path = %src.display(), error = %e, "failed to copy file");
                    progress.add_error(format!("Failed to copy {}: {}", src.display(), e));
                }
            }
        }

        if let Some(callback) = progress_callback {
            callback(&progress);
        }

        Ok(progress)
    }

    /// Relative paths of every regular file below `source`, in a stable order.
    fn collect_files(&self, source: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| LectureSyncError::InvalidPath {
                    path: entry.path().display().to_string(),
                })?;
            files.push(relative.to_path_buf());
        }

        Ok(files)
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        // A directory occupying the file's name cannot be overwritten by a file
        if dest.is_dir() {
            return Err(LectureSyncError::InvalidPath {
                path: format!("{} is a directory", dest.display()),
            });
        }

        let source_file = fs::File::open(source)?;
        let dest_file = fs::File::create(dest)?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dest_file);

        let total_bytes = std::io::copy(&mut reader, &mut writer)?;
        writer.flush()?;

        // Set file modification time to match source
        if let Ok(source_metadata) = fs::metadata(source) {
            if let Ok(modified_time) = source_metadata.modified() {
                let _ = filetime::set_file_mtime(
                    dest,
                    filetime::FileTime::from_system_time(modified_time),
                );
            }
        }

        Ok(total_bytes)
    }
}

impl Default for TreeMerger {
    fn default() -> Self {
        Self::new()
    }
}
