use crate::error::{LectureSyncError, Result};
use crate::scanner::DocumentFile;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ConversionOutcome {
    /// False when there were no documents and the tool was not started.
    pub invoked: bool,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Expected outputs that exist after the run.
    pub produced: Vec<PathBuf>,
    /// Expected outputs the tool did not write.
    pub missing: Vec<PathBuf>,
}

/// Runs an external document-to-notebook tool over a directory of documents.
pub struct NotebookConverter {
    program: String,
    args: Vec<String>,
    output_extension: String,
    require_success: bool,
}

impl NotebookConverter {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: vec!["--to".to_string(), "ipynb".to_string()],
            output_extension: "ipynb".to_string(),
            require_success: true,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_output_extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.output_extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_require_success(mut self, require_success: bool) -> Self {
        self.require_success = require_success;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Resolve the program on `PATH` (or as a path) before any work starts.
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|e| {
            debug!(program = %self.program, error = %e, "converter lookup failed");
            LectureSyncError::ConverterNotFound {
                program: self.program.clone(),
            }
        })
    }

    /// Convert every document in `directory` with a single invocation of the tool.
    pub async fn convert(
        &self,
        directory: &Path,
        documents: &[DocumentFile],
    ) -> Result<ConversionOutcome> {
        if documents.is_empty() {
            info!(dir = %directory.display(), "no documents to convert");
            return Ok(ConversionOutcome {
                success: true,
                ..ConversionOutcome::default()
            });
        }

        let program = self.locate()?;

        info!(
            program = %self.program,
            documents = documents.len(),
            dir = %directory.display(),
            "converting documents"
        );

        let output = Command::new(&program)
            .args(&self.args)
            .args(documents.iter().map(|d| d.filename.as_str()))
            .current_dir(directory)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LectureSyncError::ConverterNotFound {
                    program: self.program.clone(),
                },
                _ => LectureSyncError::Io(e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();
        let success = output.status.success();

        debug!(?exit_code, stdout = %stdout.trim(), stderr = %stderr.trim(), "converter finished");

        if !success {
            if self.require_success {
                return Err(LectureSyncError::ConversionFailed {
                    program: self.program.clone(),
                    exit_code,
                    stderr,
                });
            }
            warn!(
                program = %self.program,
                ?exit_code,
                "conversion tool failed, continuing"
            );
        }

        let (produced, missing): (Vec<_>, Vec<_>) = documents
            .iter()
            .map(|d| d.with_extension(&self.output_extension))
            .partition(|p| p.is_file());

        for path in &missing {
            warn!(path = %path.display(), "expected notebook was not produced");
        }

        Ok(ConversionOutcome {
            invoked: true,
            exit_code,
            success,
            stdout,
            stderr,
            produced,
            missing,
        })
    }
}

impl Default for NotebookConverter {
    fn default() -> Self {
        Self::new("jupytext")
    }
}
