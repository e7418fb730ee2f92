use regex::Regex;
use std::path::Path;

pub struct FileFilter {
    extension: String,
    exclude_patterns: Vec<Regex>,
}

impl FileFilter {
    pub fn new<S: Into<String>>(extension: S) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_string(),
            exclude_patterns: Vec::new(),
        }
    }

    /// Invalid patterns are dropped; `Config::validate` reports them before a run.
    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Self {
        self.exclude_patterns = patterns
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();
        self
    }

    pub fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext == self.extension)
    }

    /// Relative paths matching any exclude pattern are left out of a merge.
    pub fn is_excluded(&self, relative_path: &Path) -> bool {
        let path_str = relative_path.to_string_lossy().replace('\\', "/");
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(&path_str))
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new("md")
    }
}
