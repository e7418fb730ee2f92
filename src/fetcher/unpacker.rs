use crate::error::{LectureSyncError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Entries written by one extraction, recorded so cleanup can remove exactly them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTree {
    /// Directory the archive entries were written into.
    pub root: PathBuf,
    /// Paths to delete during cleanup: the subfolder itself, or each top-level entry.
    pub top_level: Vec<PathBuf>,
    pub files_extracted: usize,
    pub entries_skipped: usize,
}

pub struct ArchiveUnpacker {
    subfolder: bool,
    quiet: bool,
}

impl ArchiveUnpacker {
    pub fn new() -> Self {
        Self {
            subfolder: false,
            quiet: false,
        }
    }

    pub fn with_subfolder(mut self, subfolder: bool) -> Self {
        self.subfolder = subfolder;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn is_zip_archive(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
    }

    /// Target directory for `archive`: its parent, or `<parent>/<stem>` in subfolder mode.
    pub fn destination_for(&self, archive: &Path) -> Result<PathBuf> {
        let parent = archive
            .parent()
            .ok_or_else(|| LectureSyncError::InvalidPath {
                path: archive.display().to_string(),
            })?;

        if !self.subfolder {
            return Ok(parent.to_path_buf());
        }

        let stem = archive
            .file_stem()
            .ok_or_else(|| LectureSyncError::InvalidPath {
                path: archive.display().to_string(),
            })?;
        Ok(parent.join(stem))
    }

    /// Extract `archive`. Returns `None` when the file is not a zip archive.
    pub fn unpack(&self, archive: &Path) -> Result<Option<ExtractedTree>> {
        if !Self::is_zip_archive(archive) {
            debug!(path = %archive.display(), "not a zip archive, nothing to extract");
            return Ok(None);
        }

        let dest = self.destination_for(archive)?;
        fs::create_dir_all(&dest)?;

        if !self.quiet {
            info!(archive = %archive.display(), dest = %dest.display(), "extracting files");
        }

        let file = fs::File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;

        let mut top_level = BTreeSet::new();
        let mut files_extracted = 0;
        let mut entries_skipped = 0;

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| archive_error(archive, e))?;

            let relative = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    warn!(entry = entry.name(), "skipping entry with unsafe path");
                    entries_skipped += 1;
                    continue;
                }
            };

            if let Some(Component::Normal(first)) = relative.components().next() {
                top_level.insert(dest.join(first));
            }

            let target = dest.join(&relative);
            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = fs::File::create(&target)?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| LectureSyncError::Archive {
                path: archive.to_path_buf(),
                message: format!("failed to extract {}: {}", relative.display(), e),
            })?;
            files_extracted += 1;
        }

        let top_level = if self.subfolder {
            vec![dest.clone()]
        } else {
            top_level.into_iter().collect()
        };

        info!(
            archive = %archive.display(),
            files = files_extracted,
            skipped = entries_skipped,
            "extraction complete"
        );

        Ok(Some(ExtractedTree {
            root: dest,
            top_level,
            files_extracted,
            entries_skipped,
        }))
    }
}

impl Default for ArchiveUnpacker {
    fn default() -> Self {
        Self::new()
    }
}

fn archive_error(archive: &Path, error: zip::result::ZipError) -> LectureSyncError {
    LectureSyncError::Archive {
        path: archive.to_path_buf(),
        message: error.to_string(),
    }
}
