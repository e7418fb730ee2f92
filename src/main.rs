use anyhow::Context;
use clap::Parser;
use lecture_sync::{
    Cli, LectureSync, LectureSyncError, OutputFormatter, OutputMode, UserFriendlyError,
};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }

    // Handle special commands first
    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let sync = match LectureSync::from_cli(&cli) {
        Ok(sync) => sync,
        Err(e) => {
            print_startup_error(&cli, &e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(&sync);
    }

    match sync.run().await {
        Ok(report) => {
            sync.output_formatter().print_run_report(&report);

            if report.has_warnings() {
                2 // Success with warnings
            } else {
                0
            }
        }
        Err(e) => {
            sync.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &LectureSyncError) -> i32 {
    match error {
        LectureSyncError::Cancelled => 130, // Interrupted (SIGINT)
        LectureSyncError::InvalidUrl { .. } => 2,
        LectureSyncError::HttpStatus { .. } => 3,
        LectureSyncError::ConverterNotFound { .. } => 4,
        LectureSyncError::NetworkError { .. } => 5,
        LectureSyncError::ConversionFailed { .. } => 6,
        LectureSyncError::MissingSource { .. } => 7,
        LectureSyncError::Timeout { .. } => 9,
        _ => 1,
    }
}

/// Logs go to stderr so JSON on stdout stays parseable. `RUST_LOG` wins over `-v`.
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)
            .context("invalid RUST_LOG directives")?,
        _ => EnvFilter::try_new(cli.log_filter()).context("invalid default log filter")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("a global subscriber is already installed: {}", e))
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "lecture-sync.toml".to_string());

    match LectureSync::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  lecture-sync --config {}", config_path);
            println!("\nEdit the file to customize settings for your needs.");
            0
        }
        Err(e) => {
            eprintln!(
                "Failed to generate configuration file: {}",
                e.user_message()
            );
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(sync: &LectureSync) -> i32 {
    let formatter = sync.output_formatter();
    let config = sync.config();

    formatter.print_header("Dry run: nothing will be downloaded or changed");
    formatter.info(&format!("Workspace: {}", config.workspace.root.display()));

    match formatter.mode() {
        OutputMode::Json => {
            let plan = serde_json::json!({
                "type": "plan",
                "workspace": config.workspace.root,
                "steps": sync.plan(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).unwrap_or_else(|_| "{}".to_string())
            );
        }
        _ if formatter.is_quiet() => {}
        _ => {
            for (index, step) in sync.plan().iter().enumerate() {
                println!("  {}. {}", index + 1, step);
            }
        }
    }

    if let Err(e) = lecture_sync::NotebookConverter::new(config.convert.program.clone()).locate() {
        formatter.warning(&e.user_message());
    }

    formatter.print_separator();
    formatter.success("Dry run completed successfully");
    0
}

fn print_startup_error(cli: &Cli, error: &LectureSyncError) {
    let formatter = OutputFormatter::new(
        OutputMode::from(cli.output_format.clone()),
        0,
        false,
    );
    formatter.print_user_friendly_error(error);
}
