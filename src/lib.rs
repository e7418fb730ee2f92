pub mod cli;
pub mod config;
pub mod converter;
pub mod error;
pub mod fetcher;
pub mod merger;
pub mod rewriter;
pub mod scanner;
pub mod ui;
pub mod workspace;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, DEFAULT_LECTURE_URL};
pub use error::{LectureSyncError, Result, UserFriendlyError};

// Core functionality re-exports
pub use converter::{ConversionOutcome, NotebookConverter};
pub use fetcher::{ArchiveFetcher, ArchiveUnpacker, DownloadProgress, ExtractedTree, FetchOutcome};
pub use merger::{MergeProgress, TreeMerger};
pub use rewriter::{DocumentRewriter, RewriteRule, RewriteSummary};
pub use scanner::{DocumentFile, DocumentScanner, FileFilter};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};
pub use workspace::{CleanupReport, PipelineStage, RunReport, WorkspaceCleaner};

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task;
use tracing::{debug, info, warn};

/// Main library interface: runs the fetch, extract, merge, rewrite, convert
/// and cleanup stages against one workspace.
pub struct LectureSync {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl LectureSync {
    /// Create a new instance and install the Ctrl-C handler.
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let shutdown = GracefulShutdown::new()?;
        Ok(Self::with_shutdown(
            config,
            output_mode,
            verbose,
            quiet,
            shutdown,
        ))
    }

    /// Create an instance around an existing shutdown flag (no signal handler registration).
    pub fn with_shutdown(
        config: Config,
        output_mode: OutputMode,
        verbose: u8,
        quiet: bool,
        shutdown: GracefulShutdown,
    ) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);

        Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        }
    }

    /// Create an instance from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = OutputMode::from(cli_args.output_format.clone());

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Run the whole pipeline once.
    pub async fn run(&self) -> Result<RunReport> {
        let start_time = Instant::now();
        self.config.validate()?;

        let mut report = RunReport::new(&self.config.fetch.url, self.config.content_directory());

        self.shutdown.check_shutdown()?;
        self.output_formatter.start_operation("Synchronizing lectures");

        // Fail before downloading anything if the converter is unavailable
        let converter = self.notebook_converter();
        let program = converter.locate()?;
        debug!(program = %program.display(), "conversion tool located");

        // Step 1: Download the archive
        let fetched = self.fetch_archive().await?;
        report.archive_path = Some(fetched.path.clone());
        report.fetch_skipped = fetched.skipped;
        report.bytes_downloaded = fetched.bytes_downloaded;
        self.complete(&mut report, PipelineStage::Fetched);
        self.shutdown.check_shutdown()?;

        // Step 2: Extract it
        let extracted = self.extract_archive(&fetched.path).await?;
        if let Some(ref tree) = extracted {
            report.extracted_root = Some(tree.root.clone());
            report.files_extracted = tree.files_extracted;
            if tree.entries_skipped > 0 {
                report.add_warning(format!(
                    "{} archive entries with unsafe paths were skipped",
                    tree.entries_skipped
                ));
            }
        }
        self.complete(&mut report, PipelineStage::Extracted);
        self.shutdown.check_shutdown()?;

        // Step 3: Merge the lecture sources into the content directory
        let extraction_root = match extracted {
            Some(ref tree) => tree.root.clone(),
            None => fetched
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.config.workspace.root.clone()),
        };
        let content_dir = workspace::absolute(&self.config.content_directory())?;
        let merge_progress = self
            .merge_sources(
                extraction_root.join(&self.config.merge.source),
                content_dir.clone(),
            )
            .await?;
        report.files_merged = merge_progress.files_copied;
        for error in merge_progress.errors {
            report.add_warning(error);
        }
        self.complete(&mut report, PipelineStage::Merged);
        self.shutdown.check_shutdown()?;

        // Step 4: Rewrite shell escapes in the documents
        let documents = DocumentScanner::for_extension(&self.config.rewrite.extension)
            .scan_directory(&content_dir)?;
        let rewrite_summary = self.rewrite_documents(&documents).await?;
        report.documents_found = rewrite_summary.documents_scanned;
        report.documents_rewritten = rewrite_summary.documents_changed.len();
        report.lines_rewritten = rewrite_summary.lines_changed;
        self.complete(&mut report, PipelineStage::Rewritten);
        self.shutdown.check_shutdown()?;

        // Step 5: Convert to notebooks
        let outcome = self.convert_documents(&converter, &content_dir, &documents).await?;
        report.converter_exit_code = outcome.exit_code;
        if outcome.invoked && !outcome.success {
            report.add_warning(format!(
                "{} exited with status {}",
                converter.program(),
                outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            ));
        }
        for missing in &outcome.missing {
            report.add_warning(format!("Notebook was not produced: {}", missing.display()));
        }
        report.notebooks = outcome.produced;
        self.complete(&mut report, PipelineStage::Converted);
        self.shutdown.check_shutdown()?;

        // Step 6: Remove sources, the extracted tree and the archive
        let cleanup = self
            .clean_workspace(documents, extracted, fetched.path, content_dir)
            .await?;
        report.removed = cleanup.removed;
        for retained in cleanup.retained {
            report.add_warning(format!(
                "Kept {} because it contains the content directory",
                retained.display()
            ));
        }
        for failure in cleanup.failures {
            report.add_warning(failure);
        }
        self.complete(&mut report, PipelineStage::CleanedUp);

        report.duration = start_time.elapsed();
        info!(
            duration_ms = report.duration.as_millis() as u64,
            warnings = report.warnings.len(),
            "pipeline finished"
        );

        Ok(report)
    }

    async fn fetch_archive(&self) -> Result<FetchOutcome> {
        let url = &self.config.fetch.url;
        self.output_formatter.start_operation(&format!("Fetching {}", url));

        let download_progress = self.progress_manager.create_download_progress("Downloading");
        let progress_callback = {
            let pb = download_progress.clone();
            move |progress: DownloadProgress| {
                ui::progress::update_download_progress(&pb, progress);
            }
        };

        let fetcher = ArchiveFetcher::new()
            .with_timeout(self.config.fetch_timeout_duration())
            .with_overwrite(self.config.fetch.overwrite)
            .with_quiet(self.output_formatter.is_quiet())
            .with_progress(progress_callback)
            .with_running_flag(self.shutdown.running_flag());

        let result = fetcher
            .fetch(
                url,
                self.config.fetch.archive.as_deref(),
                &self.config.workspace.root,
            )
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                download_progress.abandon();
                return Err(e);
            }
        };

        if outcome.skipped {
            download_progress.finish_and_clear();
            self.output_formatter.info(&format!(
                "Using existing archive {}",
                outcome.path.display()
            ));
        } else {
            ui::progress::finish_progress_with_summary(
                &download_progress,
                &format!(
                    "Downloaded {}",
                    ui::output::format_bytes(outcome.bytes_downloaded)
                ),
                download_progress.elapsed(),
            );
        }

        Ok(outcome)
    }

    async fn extract_archive(&self, archive: &Path) -> Result<Option<ExtractedTree>> {
        if !self.config.fetch.unzip {
            debug!("extraction disabled");
            return Ok(None);
        }

        self.output_formatter.start_operation(&format!("Extracting {}", archive.display()));
        let spinner = self.progress_manager.create_spinner("Extracting archive");

        let unpacker = ArchiveUnpacker::new()
            .with_subfolder(self.config.fetch.subfolder)
            .with_quiet(self.output_formatter.is_quiet());
        let archive = archive.to_path_buf();

        let result = task::spawn_blocking(move || unpacker.unpack(&archive))
            .await
            .map_err(|e| task_failed("Extraction", e))?;

        match result {
            Ok(Some(tree)) => {
                ui::progress::finish_progress_with_summary(
                    &spinner,
                    &format!("Extracted {} files", tree.files_extracted),
                    spinner.elapsed(),
                );
                Ok(Some(tree))
            }
            Ok(None) => {
                spinner.finish_and_clear();
                Ok(None)
            }
            Err(e) => {
                spinner.abandon();
                Err(e)
            }
        }
    }

    async fn merge_sources(&self, source: PathBuf, destination: PathBuf) -> Result<MergeProgress> {
        self.output_formatter.start_operation(&format!(
            "Merging {} into {}",
            source.display(),
            destination.display()
        ));

        let file_progress = self.progress_manager.create_file_progress(0);
        let progress_callback = {
            let pb = file_progress.clone();
            move |progress: &MergeProgress| {
                pb.set_length(progress.total_files as u64);
                ui::progress::update_merge_progress(&pb, progress);
            }
        };

        let merger =
            TreeMerger::new().with_exclude_patterns(&self.config.merge.exclude_patterns);

        let result = task::spawn_blocking(move || {
            merger.merge(&source, &destination, Some(&progress_callback))
        })
        .await
        .map_err(|e| task_failed("Merge", e))?;

        let merge_progress = match result {
            Ok(progress) => progress,
            Err(e) => {
                file_progress.abandon();
                return Err(e);
            }
        };

        ui::progress::finish_progress_with_summary(
            &file_progress,
            &format!("Merged {} files", merge_progress.files_copied),
            merge_progress.elapsed(),
        );

        for error in &merge_progress.errors {
            warn!(error = %error, "merge issue");
        }

        Ok(merge_progress)
    }

    async fn rewrite_documents(&self, documents: &[DocumentFile]) -> Result<RewriteSummary> {
        let rule = RewriteRule::new(
            self.config.rewrite.marker.clone(),
            self.config.rewrite.replacement.clone(),
        );
        self.output_formatter.start_operation(&format!(
            "Rewriting '{}' to '{}' in {} documents",
            rule.marker(),
            rule.replacement(),
            documents.len()
        ));

        let rewriter = DocumentRewriter::new(rule);
        let documents = documents.to_vec();
        let summary = task::spawn_blocking(move || rewriter.rewrite_documents(&documents))
            .await
            .map_err(|e| task_failed("Rewrite", e))??;
        self.output_formatter.debug(&format!(
            "{} lines changed in {} documents",
            summary.lines_changed,
            summary.documents_changed.len()
        ));

        Ok(summary)
    }

    async fn convert_documents(
        &self,
        converter: &NotebookConverter,
        directory: &Path,
        documents: &[DocumentFile],
    ) -> Result<ConversionOutcome> {
        self.output_formatter.start_operation(&format!(
            "Converting {} documents with {}",
            documents.len(),
            converter.program()
        ));
        let spinner = self.progress_manager.create_spinner("Converting documents");

        match converter.convert(directory, documents).await {
            Ok(outcome) => {
                ui::progress::finish_progress_with_summary(
                    &spinner,
                    &format!("Produced {} notebooks", outcome.produced.len()),
                    spinner.elapsed(),
                );
                Ok(outcome)
            }
            Err(e) => {
                spinner.abandon();
                Err(e)
            }
        }
    }

    async fn clean_workspace(
        &self,
        documents: Vec<DocumentFile>,
        extracted: Option<ExtractedTree>,
        archive: PathBuf,
        content_dir: PathBuf,
    ) -> Result<CleanupReport> {
        self.output_formatter.start_operation("Cleaning up");

        let cleaner = WorkspaceCleaner::new()
            .with_remove_sources(self.config.cleanup.remove_sources)
            .with_remove_extracted(self.config.cleanup.remove_extracted)
            .with_remove_archive(self.config.cleanup.remove_archive)
            .with_protected_path(content_dir);

        task::spawn_blocking(move || cleaner.clean(&documents, extracted.as_ref(), Some(&archive)))
            .await
            .map_err(|e| task_failed("Cleanup", e))
    }

    fn notebook_converter(&self) -> NotebookConverter {
        NotebookConverter::new(self.config.convert.program.clone())
            .with_args(self.config.convert.args.clone())
            .with_output_extension(self.config.convert.output_extension.clone())
            .with_require_success(self.config.convert.require_success)
    }

    fn complete(&self, report: &mut RunReport, stage: PipelineStage) {
        info!(stage = %stage, "stage complete");
        report.complete_stage(stage);
    }

    /// Human-readable description of what `run` would do with the current configuration.
    pub fn plan(&self) -> Vec<String> {
        let config = &self.config;
        let archive = match config.fetch.archive {
            Some(ref archive) => config.resolve(archive),
            None => match cli::archive_name_from_url(&config.fetch.url) {
                Ok(name) => config.resolve(name),
                Err(_) => PathBuf::from("<unknown>"),
            },
        };

        let mut steps = vec![format!(
            "Download {} to {}{}",
            config.fetch.url,
            archive.display(),
            if config.fetch.overwrite {
                " (overwrite)"
            } else {
                " (skip if present)"
            }
        )];

        if config.fetch.unzip {
            steps.push(format!(
                "Extract archive{}",
                if config.fetch.subfolder {
                    " into a folder named after it"
                } else {
                    " next to it"
                }
            ));
        }

        steps.push(format!(
            "Merge {} into {}",
            config.merge.source.display(),
            config.content_directory().display()
        ));
        steps.push(format!(
            "Rewrite '{}' to '{}' in *.{} files",
            config.rewrite.marker, config.rewrite.replacement, config.rewrite.extension
        ));
        steps.push(format!(
            "Run {} {} on the documents",
            config.convert.program,
            config.convert.args.join(" ")
        ));

        let mut removals = Vec::new();
        if config.cleanup.remove_sources {
            removals.push("source documents");
        }
        if config.cleanup.remove_extracted {
            removals.push("extracted files");
        }
        if config.cleanup.remove_archive {
            removals.push("archive");
        }
        if !removals.is_empty() {
            steps.push(format!("Remove {}", removals.join(", ")));
        }

        steps
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &LectureSyncError) {
        self.progress_manager.clear();
        self.output_formatter.print_user_friendly_error(error);
    }
}

fn task_failed(stage: &str, error: task::JoinError) -> LectureSyncError {
    LectureSyncError::Config {
        message: format!("{} task failed: {}", stage, error),
    }
}
