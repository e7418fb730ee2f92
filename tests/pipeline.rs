#![cfg(unix)]

use lecture_sync::{
    Config, GracefulShutdown, LectureSync, LectureSyncError, OutputMode, PipelineStage,
};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARCHIVE_ROUTE: &str = "/QuantEcon/lecture-python-intro/archive/refs/heads/main.zip";

fn lecture_archive() -> Vec<u8> {
    zip_bytes(&[
        ("lecture-python-intro-main/", ""),
        ("lecture-python-intro-main/README.md", "# Lectures\n"),
        (
            "lecture-python-intro-main/lectures/intro.md",
            "# Intro\n\n```{code-cell}\n!pip install quantecon\n```\n",
        ),
        (
            "lecture-python-intro-main/lectures/plain.md",
            "# Plain\n\nNo installs here.\n",
        ),
        ("lecture-python-intro-main/lectures/_static/fig.png", "png"),
    ])
}

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();

    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
    }

    zip.finish().unwrap().into_inner()
}

/// A stand-in for jupytext: copies each `x.md` to `x.ipynb`.
fn fake_converter(dir: &Path) -> PathBuf {
    script(
        dir,
        "fake-jupytext",
        r#"[ "$1" = "--to" ] || exit 64
shift 2
for f in "$@"; do cp "$f" "${f%.md}.ipynb"; done"#,
    )
}

fn failing_converter(dir: &Path) -> PathBuf {
    script(dir, "broken-jupytext", "echo 'conversion exploded' >&2\nexit 1")
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config_for(workspace: &Path, url: String, converter: &Path) -> Config {
    let mut config = Config::default();
    config.workspace.root = workspace.to_path_buf();
    config.fetch.url = url;
    config.convert.program = converter.to_string_lossy().to_string();
    config
}

fn pipeline(config: Config) -> LectureSync {
    LectureSync::with_shutdown(
        config,
        OutputMode::Plain,
        0,
        true,
        GracefulShutdown::new_for_test(),
    )
}

async fn serve_archive(server: &MockServer, expected_requests: u64) {
    Mock::given(method("GET"))
        .and(path(ARCHIVE_ROUTE))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(lecture_archive()))
        .expect(expected_requests)
        .mount(server)
        .await;
}

fn files_with_extension(dir: &Path, extension: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|e| e == extension))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn full_run_leaves_only_notebooks() {
    let server = MockServer::start().await;
    serve_archive(&server, 1).await;

    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = fake_converter(tools.path());

    // Pre-existing content survives the merge
    let content = workspace.path().join("content").join("lectures");
    fs::create_dir_all(&content).unwrap();
    fs::write(content.join("local.ipynb"), "{}").unwrap();

    let config = config_for(
        workspace.path(),
        format!("{}{}", server.uri(), ARCHIVE_ROUTE),
        &converter,
    );
    let report = pipeline(config).run().await.unwrap();

    assert_eq!(
        report.stages,
        vec![
            PipelineStage::Fetched,
            PipelineStage::Extracted,
            PipelineStage::Merged,
            PipelineStage::Rewritten,
            PipelineStage::Converted,
            PipelineStage::CleanedUp,
        ]
    );
    assert!(!report.fetch_skipped);
    assert!(report.bytes_downloaded > 0);
    assert_eq!(report.files_merged, 3);
    assert_eq!(report.documents_found, 2);
    assert_eq!(report.documents_rewritten, 1);
    assert_eq!(report.lines_rewritten, 1);
    assert_eq!(report.converter_exit_code, Some(0));
    assert_eq!(report.notebooks.len(), 2);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    // No documents remain, notebooks carry the rewritten text
    assert!(files_with_extension(&content, "md").is_empty());
    assert_eq!(
        files_with_extension(&content, "ipynb"),
        vec!["intro.ipynb", "local.ipynb", "plain.ipynb"]
    );
    let notebook = fs::read_to_string(content.join("intro.ipynb")).unwrap();
    assert!(notebook.contains("%pip install quantecon"));
    assert!(!notebook.contains("!pip"));
    assert!(content.join("_static").join("fig.png").is_file());

    // Archive and extracted tree are gone
    assert!(!workspace.path().join("qe-lecture-intro-main.zip").exists());
    assert!(!workspace.path().join("lecture-python-intro-main").exists());
}

#[tokio::test]
async fn existing_archive_is_reused_without_network() {
    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = fake_converter(tools.path());

    fs::write(
        workspace.path().join("qe-lecture-intro-main.zip"),
        lecture_archive(),
    )
    .unwrap();

    // Nothing listens here; any request would fail the run
    let config = config_for(
        workspace.path(),
        "http://127.0.0.1:9/archive/refs/heads/main.zip".to_string(),
        &converter,
    );
    let report = pipeline(config).run().await.unwrap();

    assert!(report.fetch_skipped);
    assert_eq!(report.bytes_downloaded, 0);
    assert!(report.stages.contains(&PipelineStage::CleanedUp));
    assert!(workspace
        .path()
        .join("content/lectures/intro.ipynb")
        .is_file());
    assert!(!workspace.path().join("qe-lecture-intro-main.zip").exists());
}

#[tokio::test]
async fn every_run_downloads_again() {
    let server = MockServer::start().await;
    serve_archive(&server, 2).await;

    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = fake_converter(tools.path());
    let url = format!("{}{}", server.uri(), ARCHIVE_ROUTE);

    for _ in 0..2 {
        let config = config_for(workspace.path(), url.clone(), &converter);
        let report = pipeline(config).run().await.unwrap();
        assert!(!report.fetch_skipped);
    }

    let content = workspace.path().join("content/lectures");
    assert!(files_with_extension(&content, "md").is_empty());
    assert_eq!(
        files_with_extension(&content, "ipynb"),
        vec!["intro.ipynb", "plain.ipynb"]
    );
}

#[tokio::test]
async fn failed_conversion_keeps_sources() {
    let server = MockServer::start().await;
    serve_archive(&server, 1).await;

    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = failing_converter(tools.path());

    let config = config_for(
        workspace.path(),
        format!("{}{}", server.uri(), ARCHIVE_ROUTE),
        &converter,
    );
    let result = pipeline(config).run().await;

    match result {
        Err(LectureSyncError::ConversionFailed {
            exit_code, stderr, ..
        }) => {
            assert_eq!(exit_code, Some(1));
            assert!(stderr.contains("conversion exploded"));
        }
        other => panic!("expected ConversionFailed, got {:?}", other),
    }

    // Rewritten sources, the archive and the extracted tree are all retained
    let intro = workspace.path().join("content/lectures/intro.md");
    assert!(fs::read_to_string(intro)
        .unwrap()
        .contains("%pip install quantecon"));
    assert!(workspace.path().join("qe-lecture-intro-main.zip").is_file());
    assert!(workspace.path().join("lecture-python-intro-main").is_dir());
}

#[tokio::test]
async fn tolerated_conversion_failure_still_cleans_up() {
    let server = MockServer::start().await;
    serve_archive(&server, 1).await;

    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = failing_converter(tools.path());

    let mut config = config_for(
        workspace.path(),
        format!("{}{}", server.uri(), ARCHIVE_ROUTE),
        &converter,
    );
    config.convert.require_success = false;

    let report = pipeline(config).run().await.unwrap();

    assert_eq!(report.converter_exit_code, Some(1));
    assert!(report.has_warnings());
    assert!(report.notebooks.is_empty());
    assert!(!workspace.path().join("content/lectures/intro.md").exists());
    assert!(!workspace.path().join("qe-lecture-intro-main.zip").exists());
}

#[tokio::test]
async fn subfolder_extraction_is_removed_as_a_whole() {
    let server = MockServer::start().await;
    serve_archive(&server, 1).await;

    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = fake_converter(tools.path());

    let mut config = config_for(
        workspace.path(),
        format!("{}{}", server.uri(), ARCHIVE_ROUTE),
        &converter,
    );
    config.fetch.subfolder = true;

    let report = pipeline(config).run().await.unwrap();

    assert_eq!(
        report.extracted_root,
        Some(workspace.path().join("qe-lecture-intro-main"))
    );
    assert!(!workspace.path().join("qe-lecture-intro-main").exists());
    assert!(workspace
        .path()
        .join("content/lectures/plain.ipynb")
        .is_file());
}

#[tokio::test]
async fn extraction_folder_holding_content_survives_cleanup() {
    let server = MockServer::start().await;
    serve_archive(&server, 1).await;

    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = fake_converter(tools.path());

    // Extraction lands in `content/`, which is also the parent of the content directory
    let mut config = config_for(
        workspace.path(),
        format!("{}{}", server.uri(), ARCHIVE_ROUTE),
        &converter,
    );
    config.fetch.archive = Some("content.zip".into());
    config.fetch.subfolder = true;

    let report = pipeline(config).run().await.unwrap();

    let content = workspace.path().join("content/lectures");
    assert_eq!(
        files_with_extension(&content, "ipynb"),
        vec!["intro.ipynb", "plain.ipynb"]
    );
    assert!(files_with_extension(&content, "md").is_empty());
    assert!(report.stages.contains(&PipelineStage::CleanedUp));
    assert!(
        report.warnings.iter().any(|w| w.starts_with("Kept")),
        "{:?}",
        report.warnings
    );
    assert!(!workspace.path().join("content.zip").exists());
}

#[tokio::test]
async fn http_error_leaves_no_partial_archive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = fake_converter(tools.path());

    let config = config_for(
        workspace.path(),
        format!("{}/missing.zip", server.uri()),
        &converter,
    );
    let result = pipeline(config).run().await;

    assert!(matches!(
        result,
        Err(LectureSyncError::HttpStatus { status: 404, .. })
    ));
    assert_eq!(fs::read_dir(workspace.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn archive_without_lectures_is_a_missing_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_ROUTE))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_bytes(&[("lecture-python-intro-main/README.md", "x")])),
        )
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let converter = fake_converter(tools.path());

    let config = config_for(
        workspace.path(),
        format!("{}{}", server.uri(), ARCHIVE_ROUTE),
        &converter,
    );
    let result = pipeline(config).run().await;

    assert!(matches!(
        result,
        Err(LectureSyncError::MissingSource { .. })
    ));
}
