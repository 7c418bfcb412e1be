//! CLI entry point for the image loader.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use image_loader::browser::{ChromiumBrowser, ChromiumOptions};
use image_loader::{AcquisitionSession, LoaderConfig, RunReport, TermOutcome};
use tracing::{debug, info};

mod app_config;
mod cli;
mod progress;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_file_config(args.config.as_deref())?;
    if let Some(path) = &loaded.path {
        debug!(path = %path.display(), loaded = loaded.config.is_some(), "config file");
    }

    let mut config = LoaderConfig::default();
    if let Some(file_config) = &loaded.config {
        file_config.apply_to(&mut config);
    }
    apply_cli_overrides(&args, &mut config);

    let browser = Arc::new(ChromiumBrowser::new(ChromiumOptions {
        executable: config.chromium_path.clone(),
        navigation_timeout: config.navigation_timeout,
    }));

    // Validation happens here, before any directory or browser work.
    let session = AcquisitionSession::new(&args.keys, args.num_images, config, browser)
        .context("invalid input")?;

    info!(
        terms = session.terms().len(),
        limit = session.limit().get(),
        root = %session.layout().root().display(),
        "Image loader starting"
    );

    let use_spinner = !args.quiet && !args.json && io::stderr().is_terminal();
    let (spinner, stop) =
        progress::spawn_progress_ui(use_spinner, session.stats(), session.terms().len());

    let report = session.run().await;

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize run report")?
        );
    } else if !args.quiet {
        print_report(&report);
    }

    Ok(())
}

fn apply_cli_overrides(args: &Args, config: &mut LoaderConfig) {
    if let Some(dir) = &args.output_dir {
        config.output_root.clone_from(dir);
    }
    if args.date_stamp {
        config.date_stamp = true;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = usize::from(concurrency);
    }
    if args.headed {
        config.headless = false;
    }
    if let Some(chrome) = &args.chrome {
        config.chromium_path = Some(chrome.clone());
    }
}

fn print_report(report: &RunReport) {
    let processed: Vec<&str> = report.terms.iter().map(|t| t.term.original()).collect();
    println!("Processed terms: {}", processed.join(", "));
    println!("Elapsed: {:.1}s", report.elapsed.as_secs_f64());

    for summary in &report.terms {
        let location = summary
            .directory
            .as_ref()
            .map(|dir| format!(" -> {}", dir.display()))
            .unwrap_or_default();
        match &summary.outcome {
            TermOutcome::Completed => println!(
                "  {}: {} saved, {} failed{location}",
                summary.term, summary.saved, summary.failed
            ),
            TermOutcome::DirectoryFailed { reason }
            | TermOutcome::RenderFailed { reason }
            | TermOutcome::ExtractFailed { reason } => {
                println!("  {}: skipped ({reason})", summary.term);
            }
        }
    }

    let failures: Vec<_> = report.failures().collect();
    if failures.is_empty() {
        return;
    }
    println!("Failures ({}):", failures.len());
    for failure in failures {
        let cause = failure
            .error()
            .map(ToString::to_string)
            .unwrap_or_default();
        println!(
            "  {}\t{}\t{cause}",
            failure.reference.term,
            failure.reference.locator_preview()
        );
    }
}
