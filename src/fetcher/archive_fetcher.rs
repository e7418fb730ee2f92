use crate::cli::archive_name_from_url;
use crate::error::{LectureSyncError, Result};
use crate::workspace::absolute;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Absolute path of the archive on disk.
    pub path: PathBuf,
    /// True when an existing file was reused without network access.
    pub skipped: bool,
    pub bytes_downloaded: u64,
}

pub struct ArchiveFetcher {
    timeout: Duration,
    overwrite: bool,
    quiet: bool,
    progress_callback: Option<Box<dyn Fn(DownloadProgress) + Send + Sync>>,
    running: Arc<AtomicBool>,
}

impl ArchiveFetcher {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            overwrite: false,
            quiet: false,
            progress_callback: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Share a cancellation flag; the download stops between chunks once it is cleared.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Download `url` to `output`, or to the URL's file name inside `default_dir`.
    ///
    /// An existing output is returned as-is unless overwrite was requested.
    pub async fn fetch(
        &self,
        url: &str,
        output: Option<&Path>,
        default_dir: &Path,
    ) -> Result<FetchOutcome> {
        let output = match output {
            Some(path) => default_dir.join(path),
            None => default_dir.join(archive_name_from_url(url)?),
        };
        let output = absolute(&output)?;

        let out_dir = output
            .parent()
            .ok_or_else(|| LectureSyncError::InvalidPath {
                path: output.display().to_string(),
            })?
            .to_path_buf();
        if !out_dir.exists() {
            tokio::fs::create_dir_all(&out_dir).await?;
        }

        if output.exists() && !self.overwrite {
            if !self.quiet {
                info!(
                    path = %output.display(),
                    "archive already exists, skipping download (set overwrite to download again)"
                );
            }
            return Ok(FetchOutcome {
                path: output,
                skipped: true,
                bytes_downloaded: 0,
            });
        }

        let bytes_downloaded = self.download(url, &output, &out_dir).await?;

        Ok(FetchOutcome {
            path: output,
            skipped: false,
            bytes_downloaded,
        })
    }

    async fn download(&self, url: &str, output: &Path, out_dir: &Path) -> Result<u64> {
        let parsed = reqwest::Url::parse(url).map_err(|_| LectureSyncError::InvalidUrl {
            url: url.to_string(),
        })?;

        info!(%url, path = %output.display(), "downloading archive");

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| self.map_reqwest_error(e, url))?;

        let response = client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LectureSyncError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();

        // Stage next to the target so the final rename stays on one filesystem.
        // The staging file is removed on drop if anything below fails.
        let staging = tempfile::Builder::new()
            .prefix(".lecture-sync-")
            .suffix(".part")
            .tempfile_in(out_dir)?;
        let (std_file, staging_path) = staging.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut progress = DownloadProgress {
            downloaded_bytes: 0,
            total_bytes,
        };
        self.report(progress);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if !self.running.load(Ordering::SeqCst) {
                return Err(LectureSyncError::Cancelled);
            }

            let chunk = chunk.map_err(|e| self.map_reqwest_error(e, url))?;
            file.write_all(&chunk).await?;

            progress.downloaded_bytes += chunk.len() as u64;
            self.report(progress);
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        staging_path
            .persist(output)
            .map_err(|e| LectureSyncError::Io(e.error))?;

        debug!(
            bytes = progress.downloaded_bytes,
            path = %output.display(),
            "archive written"
        );

        Ok(progress.downloaded_bytes)
    }

    fn report(&self, progress: DownloadProgress) {
        if let Some(ref callback) = self.progress_callback {
            callback(progress);
        }
    }

    fn map_reqwest_error(&self, error: reqwest::Error, url: &str) -> LectureSyncError {
        if error.is_timeout() {
            return LectureSyncError::Timeout {
                seconds: self.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return LectureSyncError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            };
        }

        LectureSyncError::NetworkError {
            url: url.to_string(),
            message: error.to_string(),
        }
    }

}

impl Default for ArchiveFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_existing_archive_is_reused_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("lectures.zip");
        std::fs::write(&existing, b"cached").unwrap();

        // Port 9 (discard) is never contacted when the file is reused
        let fetcher = ArchiveFetcher::new();
        let outcome = fetcher
            .fetch(
                "http://127.0.0.1:9/lectures.zip",
                Some(Path::new("lectures.zip")),
                temp_dir.path(),
            )
            .await
            .unwrap();

        assert!(outcome.skipped);
        assert_eq!(outcome.bytes_downloaded, 0);
        assert_eq!(outcome.path, existing);
        assert_eq!(std::fs::read(&existing).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn test_output_name_defaults_to_url_basename() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("main.zip"), b"cached").unwrap();

        let outcome = ArchiveFetcher::new()
            .fetch(
                "http://127.0.0.1:9/archive/refs/heads/main.zip",
                None,
                temp_dir.path(),
            )
            .await
            .unwrap();

        assert!(outcome.skipped);
        assert_eq!(outcome.path, temp_dir.path().join("main.zip"));
    }

    #[tokio::test]
    async fn test_missing_parent_directories_are_created() {
        let temp_dir = TempDir::new().unwrap();

        // Unreachable host: the download fails, but only after the parent was created
        let result = ArchiveFetcher::new()
            .with_timeout(Duration::from_secs(2))
            .fetch(
                "http://127.0.0.1:9/a.zip",
                Some(Path::new("nested/dir/a.zip")),
                temp_dir.path(),
            )
            .await;

        assert!(result.is_err());
        assert!(temp_dir.path().join("nested/dir").is_dir());
        assert!(!temp_dir.path().join("nested/dir/a.zip").exists());
    }

    #[tokio::test]
    async fn test_cleared_running_flag_cancels_download() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let result = ArchiveFetcher::new()
            .with_running_flag(Arc::new(AtomicBool::new(false)))
            .fetch(&format!("{}/a.zip", server.uri()), None, temp_dir.path())
            .await;

        assert!(matches!(result, Err(LectureSyncError::Cancelled)));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
