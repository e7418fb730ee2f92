use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LectureSyncError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid archive URL: {url}")]
    InvalidUrl { url: String },

    #[error("Download of {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Network error while downloading {url}")]
    NetworkError { url: String, message: String },

    #[error("Archive could not be extracted: {path}")]
    Archive { path: PathBuf, message: String },

    #[error("Merge source directory not found: {path}")]
    MissingSource { path: PathBuf },

    #[error("Conversion tool not found: {program}")]
    ConverterNotFound { program: String },

    #[error("Conversion tool {program} failed")]
    ConversionFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for LectureSyncError {
    fn user_message(&self) -> String {
        match self {
            LectureSyncError::InvalidUrl { url } => {
                format!("Invalid archive URL: {}", url)
            }
            LectureSyncError::HttpStatus { url, status } => {
                format!("Server answered {} for {}", status, url)
            }
            LectureSyncError::NetworkError { url, message } => {
                format!("Network error while downloading {}: {}", url, message)
            }
            LectureSyncError::Archive { path, message } => {
                format!("Failed to extract {}: {}", path.display(), message)
            }
            LectureSyncError::MissingSource { path } => {
                format!("Lecture source directory not found: {}", path.display())
            }
            LectureSyncError::ConverterNotFound { program } => {
                format!("Conversion tool '{}' was not found on PATH", program)
            }
            LectureSyncError::ConversionFailed {
                program,
                exit_code,
                stderr,
            } => {
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    format!("{} exited with status {}", program, code)
                } else {
                    format!("{} exited with status {}: {}", program, code, stderr)
                }
            }
            LectureSyncError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            LectureSyncError::Cancelled => "Operation was cancelled by user".to_string(),
            LectureSyncError::Timeout { seconds } => {
                format!("Operation timed out after {} seconds", seconds)
            }
            LectureSyncError::InvalidPath { path } => {
                format!("Invalid file path: {}", path)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            LectureSyncError::InvalidUrl { .. } => Some(
                "Provide an http(s) URL pointing to a .zip archive, e.g. https://github.com/owner/repo/archive/refs/heads/main.zip".to_string()
            ),
            LectureSyncError::HttpStatus { .. } => Some(
                "Check that the archive URL is correct and publicly reachable.".to_string()
            ),
            LectureSyncError::NetworkError { .. } => Some(
                "Check your internet connection and try again.".to_string()
            ),
            LectureSyncError::Archive { .. } => Some(
                "Delete the downloaded archive and run again with --overwrite to fetch a fresh copy.".to_string()
            ),
            LectureSyncError::MissingSource { .. } => Some(
                "The archive layout may have changed. Set the source directory with --source or [merge] source in the config file.".to_string()
            ),
            LectureSyncError::ConverterNotFound { .. } => Some(
                "Install the conversion tool (e.g. `pip install jupytext`) or point --converter at it.".to_string()
            ),
            LectureSyncError::ConversionFailed { .. } => Some(
                "Source documents were kept. Fix the conversion error and run again, or pass --allow-convert-failure.".to_string()
            ),
            LectureSyncError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            LectureSyncError::Timeout { .. } => Some(
                "The download took longer than expected. Try again or increase the timeout with --timeout.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<url::ParseError> for LectureSyncError {
    fn from(error: url::ParseError) -> Self {
        LectureSyncError::InvalidUrl {
            url: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for LectureSyncError {
    fn from(error: toml::de::Error) -> Self {
        LectureSyncError::Config {
            message: error.to_string(),
        }
    }
}

impl From<walkdir::Error> for LectureSyncError {
    fn from(error: walkdir::Error) -> Self {
        LectureSyncError::Io(error.into())
    }
}

pub type Result<T> = std::result::Result<T, LectureSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_friendly_messages() {
        let error = LectureSyncError::InvalidUrl {
            url: "not-a-url".to_string(),
        };
        assert!(error.user_message().contains("Invalid archive URL"));
        assert!(error.suggestion().is_some());
    }

    #[test]
    fn test_conversion_failure_message_includes_stderr() {
        let error = LectureSyncError::ConversionFailed {
            program: "jupytext".to_string(),
            exit_code: Some(1),
            stderr: "boom\n".to_string(),
        };
        assert_eq!(error.user_message(), "jupytext exited with status 1: boom");

        let error = LectureSyncError::ConversionFailed {
            program: "jupytext".to_string(),
            exit_code: None,
            stderr: String::new(),
        };
        assert_eq!(error.user_message(), "jupytext exited with status signal");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = LectureSyncError::from(io);
        assert!(matches!(error, LectureSyncError::Io(_)));
        assert!(error.suggestion().is_none());
    }
}
