mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use samewise_core::{AppConfig, DupeEngine, DupeReport, SqliteStore};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match samewise_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Find { root, json }) => {
            if let Err(err) = run_find(config, root, json).await {
                error!("Error: {}", err);
                process::exit(1);
            }
        }
        Some(Commands::Hash {
            path,
            segment_length,
        }) => {
            if let Err(err) = run_hash(config, &path, segment_length).await {
                error!("Error: {}", err);
                process::exit(1);
            }
        }
        Some(Commands::CacheStats) => match SqliteStore::open(&config.cache_path) {
            Ok(store) => match store.count() {
                Ok(count) => info!("{} rows in {}", count, config.cache_path),
                Err(e) => error!("Error counting cache rows: {}", e),
            },
            Err(e) => error!("Error opening cache: {}", e),
        },
        Some(Commands::ClearCache) => {
            match confirm("This deletes every cached fingerprint. Continue?") {
                Ok(true) => match SqliteStore::open(&config.cache_path) {
                    Ok(store) => {
                        if let Err(e) = store.clear() {
                            error!("Error clearing cache: {}", e);
                        } else {
                            println!("Fingerprint cache cleared");
                        }
                    }
                    Err(e) => error!("Error opening cache: {}", e),
                },
                _ => {
                    process::exit(0);
                }
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

async fn run_find(
    mut config: AppConfig,
    roots: Vec<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !roots.is_empty() {
        config.root_paths = roots;
    }

    let engine = DupeEngine::open(config)?;

    // Ctrl-C flips the shared cancel flag; workers notice at their next
    // suspension point.
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let reporter = Arc::new(CliReporter::new());
    let report = engine.find_duplicates(reporter.clone()).await?;
    reporter.finish();

    if json {
        println!("{}", serde_json::to_string_pretty(&report_to_json(&report))?);
        return Ok(());
    }

    println!();
    for group in &report.groups {
        println!(
            "{} × {} ({} bytes each, {} wasted)",
            group.members.len().to_string().red(),
            group.fingerprint.to_hex()[..16].dimmed(),
            group.data_length,
            group.wasted_bytes,
        );
        for member in &group.members {
            let marker = if member.is_directory { "dir " } else { "file" };
            println!("    {} {}", marker.cyan(), member.path);
        }
    }

    println!();
    info!(
        "Scan: {}, Verify: {} ({} rounds)",
        format!("{:.2}s", report.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.verify_duration.as_secs_f64()).green(),
        report.rounds_run,
    );
    info!(
        "{} candidate groups, {} confirmed, {} bytes wasted",
        format!("{}", report.candidate_groups).cyan(),
        format!("{}", report.groups.len()).red(),
        format!("{}", report.total_wasted_bytes).red(),
    );

    Ok(())
}

async fn run_hash(
    config: AppConfig,
    path: &str,
    segment_length: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = DupeEngine::open(config)?;
    let record = engine.hash_path(Path::new(path), segment_length).await?;

    println!("{}", record.fingerprint);
    info!(
        "{} bytes covered, segment length {}",
        record.data_length, record.segment_length
    );
    Ok(())
}

fn report_to_json(report: &DupeReport) -> serde_json::Value {
    serde_json::json!({
        "candidate_groups": report.candidate_groups,
        "rounds_run": report.rounds_run,
        "scan_seconds": report.scan_duration.as_secs_f64(),
        "verify_seconds": report.verify_duration.as_secs_f64(),
        "total_wasted_bytes": report.total_wasted_bytes,
        "groups": report.groups.iter().map(|group| {
            serde_json::json!({
                "fingerprint": group.fingerprint.to_hex(),
                "data_length": group.data_length,
                "wasted_bytes": group.wasted_bytes,
                "members": group.members.iter().map(|m| {
                    serde_json::json!({
                        "path": m.path,
                        "is_directory": m.is_directory,
                    })
                }).collect::<Vec<_>>(),
            })
        }).collect::<Vec<_>>(),
    })
}

enum Answer {
    Yes,
    No,
}

fn parse_answer(input: &str) -> Option<Answer> {
    match input {
        "y" | "Y" | "yes" => Some(Answer::Yes),
        // Enter alone takes the safe default.
        "n" | "N" | "no" | "" => Some(Answer::No),
        _ => None,
    }
}

/// Ask a destructive-action question; anything but an explicit yes refuses.
fn confirm(question: &str) -> io::Result<bool> {
    loop {
        print!("{question} [y/N] ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            // EOF (piped stdin ran dry) counts as a refusal.
            return Ok(false);
        }

        match parse_answer(line.trim()) {
            Some(Answer::Yes) => return Ok(true),
            Some(Answer::No) => return Ok(false),
            None => eprintln!("Please answer y or n."),
        }
    }
}
