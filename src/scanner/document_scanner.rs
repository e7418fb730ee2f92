use crate::error::{LectureSyncError, Result};
use crate::scanner::file_filter::FileFilter;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
}

impl DocumentFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        Self {
            path,
            filename,
            size,
        }
    }

    /// Sibling path with the extension swapped, e.g. `intro.md` -> `intro.ipynb`.
    pub fn with_extension(&self, extension: &str) -> PathBuf {
        self.path.with_extension(extension)
    }
}

/// Finds the documents directly inside a directory, like a `*.md` glob.
pub struct DocumentScanner {
    filter: FileFilter,
}

impl DocumentScanner {
    pub fn new(filter: FileFilter) -> Self {
        Self { filter }
    }

    pub fn for_extension<S: Into<String>>(extension: S) -> Self {
        Self::new(FileFilter::new(extension))
    }

    pub fn scan_directory<P: AsRef<Path>>(&self, root: P) -> Result<Vec<DocumentFile>> {
        let root_path = root.as_ref();

        if !root_path.is_dir() {
            return Err(LectureSyncError::InvalidPath {
                path: format!("{} is not a directory", root_path.display()),
            });
        }

        let mut documents = Vec::new();

        let walker = WalkDir::new(root_path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false);

        for entry in walker {
            let entry = entry?;

            if entry.file_type().is_file() && self.filter.is_document(entry.path()) {
                let metadata = entry.metadata()?;
                documents.push(DocumentFile::new(entry.path().to_path_buf(), metadata.len()));
            }
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(documents)
    }
}
