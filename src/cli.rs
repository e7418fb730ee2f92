use crate::config::{CliOverrides, Config};
use crate::error::{LectureSyncError, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "lecture-sync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch lecture sources and convert them to notebooks")]
#[command(
    long_about = "lecture-sync downloads an archive of lecture sources, merges its lectures \
                  directory into a local content tree, rewrites shell-style `!pip` lines \
                  into `%pip` magics and converts every document to a notebook."
)]
#[command(after_help = "EXAMPLES:\n  \
    lecture-sync\n  \
    lecture-sync https://github.com/QuantEcon/lecture-python-intro/archive/refs/heads/main.zip\n  \
    lecture-sync --workspace site --content-dir content/lectures --keep-sources\n  \
    lecture-sync --config my-config.toml --output-format json")]
pub struct Cli {
    /// Archive URL (defaults to the configured lecture archive)
    #[arg(value_parser = validate_archive_url)]
    pub url: Option<String>,

    /// Local path of the downloaded archive
    #[arg(short, long)]
    pub archive: Option<PathBuf>,

    /// Workspace directory all relative paths are resolved against
    #[arg(short, long, env = "LECTURE_SYNC_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Directory inside the extracted archive that holds the lectures
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Destination content directory
    #[arg(long)]
    pub content_dir: Option<PathBuf>,

    /// Document extension to rewrite and convert
    #[arg(long)]
    pub extension: Option<String>,

    /// Conversion program to invoke
    #[arg(long, env = "LECTURE_SYNC_CONVERTER")]
    pub converter: Option<String>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Download timeout in seconds
    #[arg(long, help = "Timeout for the archive download (seconds)")]
    pub timeout: Option<u64>,

    /// Download again even if the archive already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Extract into a folder named after the archive
    #[arg(long)]
    pub subfolder: bool,

    /// Do not extract the downloaded archive
    #[arg(long)]
    pub no_unzip: bool,

    /// Keep the source documents after conversion
    #[arg(long)]
    pub keep_sources: bool,

    /// Continue with cleanup even when the converter fails
    #[arg(long)]
    pub allow_convert_failure: bool,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "Show the planned steps without touching the filesystem")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        let workspace = self.workspace.as_ref().map(|w| {
            if w.is_absolute() {
                w.clone()
            } else {
                std::env::current_dir().unwrap_or_default().join(w)
            }
        });

        CliOverrides::new()
            .with_url(self.url.clone())
            .with_archive(self.archive.clone())
            .with_workspace(workspace)
            .with_source(self.source.clone())
            .with_destination(self.content_dir.clone())
            .with_extension(self.extension.clone())
            .with_converter(self.converter.clone())
            .with_timeout(self.timeout)
            .with_overwrite(self.overwrite)
            .with_subfolder(self.subfolder)
            .with_no_unzip(self.no_unzip)
            .with_keep_sources(self.keep_sources)
            .with_allow_convert_failure(self.allow_convert_failure)
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Default `tracing` filter for the selected verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity_level() {
            _ if self.quiet => "lecture_sync=error",
            0 => "lecture_sync=warn",
            1 => "lecture_sync=info",
            2 => "lecture_sync=debug",
            _ => "lecture_sync=trace,reqwest=debug",
        }
    }
}

pub fn validate_archive_url(s: &str) -> std::result::Result<String, String> {
    let url =
        Url::parse(s).map_err(|_| "Invalid URL format. Please provide a valid URL.".to_string())?;

    match url.scheme() {
        "https" | "http" => {}
        _ => return Err("Only HTTP and HTTPS archive URLs are supported".to_string()),
    }

    if url.host_str().is_none_or(|h| h.is_empty()) {
        return Err("URL must include a valid hostname".to_string());
    }

    Ok(s.to_string())
}

/// Archive file name implied by a URL: its last non-empty path segment.
pub fn archive_name_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;

    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|name| name.to_string())
        .ok_or_else(|| LectureSyncError::InvalidUrl {
            url: url.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_cli() -> Cli {
        Cli {
            url: None,
            archive: None,
            workspace: None,
            source: None,
            content_dir: None,
            extension: None,
            converter: None,
            config: None,
            output_format: OutputFormat::Human,
            timeout: None,
            overwrite: false,
            subfolder: false,
            no_unzip: false,
            keep_sources: false,
            allow_convert_failure: false,
            verbose: 0,
            quiet: false,
            dry_run: false,
            generate_config: false,
        }
    }

    #[test]
    fn test_valid_archive_urls() {
        let valid_urls = [
            "https://github.com/QuantEcon/lecture-python-intro/archive/refs/heads/main.zip",
            "http://localhost:8080/archive.zip",
            "https://example.com/files/lectures.zip",
        ];

        for url in &valid_urls {
            assert!(validate_archive_url(url).is_ok(), "Should accept: {}", url);
        }
    }

    #[test]
    fn test_invalid_archive_urls() {
        let invalid_urls = [
            "not-a-url",
            "ftp://example.com/archive.zip",
            "file:///tmp/archive.zip",
        ];

        for url in &invalid_urls {
            assert!(validate_archive_url(url).is_err(), "Should reject: {}", url);
        }
    }

    #[test]
    fn test_archive_name_from_url() {
        assert_eq!(
            archive_name_from_url(
                "https://github.com/QuantEcon/lecture-python-intro/archive/refs/heads/main.zip"
            )
            .unwrap(),
            "main.zip"
        );
        assert_eq!(
            archive_name_from_url("https://example.com/a/b.zip/").unwrap(),
            "b.zip"
        );
        assert!(archive_name_from_url("https://example.com/").is_err());
    }

    #[test]
    fn test_overrides_from_flags() {
        let mut cli = bare_cli();
        cli.overwrite = true;
        cli.no_unzip = true;
        cli.converter = Some("fake-converter".to_string());

        let overrides = cli.create_cli_overrides();
        assert!(overrides.overwrite);
        assert!(overrides.no_unzip);
        assert!(!overrides.subfolder);
        assert_eq!(overrides.converter.as_deref(), Some("fake-converter"));
    }

    #[test]
    fn test_log_filter_follows_verbosity() {
        let mut cli = bare_cli();
        assert_eq!(cli.log_filter(), "lecture_sync=warn");

        cli.verbose = 2;
        assert_eq!(cli.log_filter(), "lecture_sync=debug");

        cli.quiet = true;
        assert_eq!(cli.log_filter(), "lecture_sync=error");
        assert_eq!(cli.verbosity_level(), 0);
    }
}
