use crate::error::{LectureSyncError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Latest `main` branch of the QuantEcon introductory lectures.
pub const DEFAULT_LECTURE_URL: &str =
    "https://github.com/QuantEcon/lecture-python-intro/archive/refs/heads/main.zip";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub fetch: FetchConfig,
    pub merge: MergeConfig,
    pub rewrite: RewriteConfig,
    pub convert: ConvertConfig,
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub url: String,
    /// Archive path relative to the workspace. Derived from the URL when unset.
    pub archive: Option<PathBuf>,
    pub overwrite: bool,
    pub unzip: bool,
    pub subfolder: bool,
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Relative to the extraction root.
    pub source: PathBuf,
    /// Relative to the workspace.
    pub destination: PathBuf,
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub extension: String,
    pub marker: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub program: String,
    pub args: Vec<String>,
    pub output_extension: String,
    pub require_success: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub remove_sources: bool,
    pub remove_extracted: bool,
    pub remove_archive: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LECTURE_URL.to_string(),
            archive: Some(PathBuf::from("qe-lecture-intro-main.zip")),
            overwrite: false,
            unzip: true,
            subfolder: false,
            timeout: 300, // 5 minutes
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("lecture-python-intro-main").join("lectures"),
            destination: PathBuf::from("content").join("lectures"),
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            extension: "md".to_string(),
            marker: "pip".to_string(),
            replacement: "%pip".to_string(),
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            program: "jupytext".to_string(),
            args: vec!["--to".to_string(), "ipynb".to_string()],
            output_extension: "ipynb".to_string(),
            require_success: true,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            remove_sources: true,
            remove_extracted: true,
            remove_archive: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LectureSyncError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LectureSyncError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| LectureSyncError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["lecture-sync.toml", ".lecture-sync.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref url) = cli_args.url {
            self.fetch.url = url.clone();
            // A different URL means the default archive name no longer applies
            if cli_args.archive.is_none() {
                self.fetch.archive = None;
            }
        }

        if let Some(ref archive) = cli_args.archive {
            self.fetch.archive = Some(archive.clone());
        }

        if let Some(ref root) = cli_args.workspace {
            self.workspace.root = root.clone();
        }

        if let Some(ref source) = cli_args.source {
            self.merge.source = source.clone();
        }

        if let Some(ref destination) = cli_args.destination {
            self.merge.destination = destination.clone();
        }

        if let Some(ref extension) = cli_args.extension {
            self.rewrite.extension = extension.trim_start_matches('.').to_string();
        }

        if let Some(ref program) = cli_args.converter {
            self.convert.program = program.clone();
        }

        if let Some(timeout) = cli_args.timeout {
            self.fetch.timeout = timeout;
        }

        if cli_args.overwrite {
            self.fetch.overwrite = true;
        }

        if cli_args.subfolder {
            self.fetch.subfolder = true;
        }

        if cli_args.no_unzip {
            self.fetch.unzip = false;
        }

        if cli_args.keep_sources {
            self.cleanup.remove_sources = false;
        }

        if cli_args.allow_convert_failure {
            self.convert.require_success = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.url.trim().is_empty() {
            return Err(LectureSyncError::Config {
                message: "An archive URL must be specified".to_string(),
            });
        }

        if self.fetch.timeout == 0 {
            return Err(LectureSyncError::Config {
                message: "Download timeout must be greater than 0".to_string(),
            });
        }

        if self.rewrite.extension.is_empty() {
            return Err(LectureSyncError::Config {
                message: "A document extension must be specified".to_string(),
            });
        }

        if self.rewrite.marker.is_empty() {
            return Err(LectureSyncError::Config {
                message: "The rewrite marker cannot be empty".to_string(),
            });
        }

        if self.convert.program.trim().is_empty() {
            return Err(LectureSyncError::Config {
                message: "A conversion program must be specified".to_string(),
            });
        }

        if self.convert.output_extension == self.rewrite.extension {
            return Err(LectureSyncError::Config {
                message: format!(
                    "Conversion output extension must differ from the document extension ({})",
                    self.rewrite.extension
                ),
            });
        }

        for pattern in &self.merge.exclude_patterns {
            Regex::new(pattern).map_err(|e| LectureSyncError::Config {
                message: format!("Invalid exclude pattern '{}': {}", pattern, e),
            })?;
        }

        if !self.workspace.root.is_dir() {
            return Err(LectureSyncError::Config {
                message: format!(
                    "Workspace directory does not exist: {}",
                    self.workspace.root.display()
                ),
            });
        }

        Ok(())
    }

    /// Resolve a workspace-relative path. Absolute paths are returned unchanged.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.workspace.root.join(path)
    }

    pub fn content_directory(&self) -> PathBuf {
        self.resolve(&self.merge.destination)
    }

    pub fn fetch_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout)
    }

    pub fn create_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.workspace.root = PathBuf::from(".");
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub archive: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub extension: Option<String>,
    pub converter: Option<String>,
    pub timeout: Option<u64>,
    pub overwrite: bool,
    pub subfolder: bool,
    pub no_unzip: bool,
    pub keep_sources: bool,
    pub allow_convert_failure: bool,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_archive(mut self, archive: Option<PathBuf>) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_workspace(mut self, workspace: Option<PathBuf>) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_source(mut self, source: Option<PathBuf>) -> Self {
        self.source = source;
        self
    }

    pub fn with_destination(mut self, destination: Option<PathBuf>) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }

    pub fn with_converter(mut self, converter: Option<String>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_subfolder(mut self, subfolder: bool) -> Self {
        self.subfolder = subfolder;
        self
    }

    pub fn with_no_unzip(mut self, no_unzip: bool) -> Self {
        self.no_unzip = no_unzip;
        self
    }

    pub fn with_keep_sources(mut self, keep: bool) -> Self {
        self.keep_sources = keep;
        self
    }

    pub fn with_allow_convert_failure(mut self, allow: bool) -> Self {
        self.allow_convert_failure = allow;
        self
    }
}
