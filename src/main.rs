//! Proof-of-work miner - command-line front end
//!
//! Runs one search for the configured block, reports progress through the
//! log and prints the outcome on stdout.

use pow_miner::{
    config::Config,
    logging::init_logging,
    mine_async,
    utils::{format_duration, format_hash_rate, percentage_of_expected},
    BlockDescriptor, Error, MiningResult, SearchControl, SearchEvent, SearchStats,
    APP_DESCRIPTION, APP_NAME, APP_VERSION,
};

use serde::Serialize;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of a run, as printed with `--json`
#[derive(Debug, Serialize)]
struct Report<'a> {
    status: &'static str,
    block: &'a BlockDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a MiningResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<&'a SearchStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> Report<'a> {
    fn new(block: &'a BlockDescriptor, outcome: &'a pow_miner::Result<MiningResult>) -> Self {
        match outcome {
            Ok(result) => Self {
                status: "found",
                block,
                result: Some(result),
                stats: None,
                error: None,
            },
            Err(e) => Self {
                status: e.category(),
                block,
                result: None,
                stats: e.stats(),
                error: Some(e.to_string()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load and validate configuration
    let config = match Config::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", APP_NAME, e);
            return exit_code(&e);
        }
    };

    init_logging(config.log_level, config.log_format);

    if config.print_config {
        return match print_configuration(&config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Failed to print configuration: {}", e);
                exit_code(&e)
            }
        };
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_fatal() {
                error!("Mining failed ({}): {}", e.category(), e);
            }
            exit_code(&e)
        }
    }
}

/// Mine the configured block and print the outcome
async fn run(config: Config) -> pow_miner::Result<()> {
    let block = config.block()?;
    let options = config.search_options()?;

    info!("Starting {} v{}: {}", APP_NAME, APP_VERSION, APP_DESCRIPTION);
    info!(
        "Configuration: block={}, difficulty={}, threads={}, encoding={}",
        block.block_number(),
        block.difficulty(),
        options.effective_workers(),
        options.encoding
    );

    let cancellation = CancellationToken::new();
    let signal_handle = tokio::spawn(cancel_on_ctrl_c(cancellation.clone()));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let expected_attempts = block.difficulty().expected_attempts();
    let reporter_handle = tokio::spawn(report_events(events_rx, expected_attempts));

    let control = SearchControl::new()
        .with_cancellation(cancellation.clone())
        .with_events(events_tx);

    if !config.json {
        println!(
            "Mining block #{} (looking for a hash starting with \"{}\")",
            block.block_number(),
            block.difficulty().prefix()
        );
    }

    let outcome = mine_async(block.clone(), options, control).await;

    // The search dropped its event sender, so the reporter drains and ends.
    if let Err(e) = reporter_handle.await {
        warn!("Progress reporter failed: {}", e);
    }
    signal_handle.abort();

    if config.json {
        println!("{}", serde_json::to_string_pretty(&Report::new(&block, &outcome))?);
    } else {
        print_outcome(&outcome);
    }

    outcome.map(|_| ())
}

/// Cancel the search on the first Ctrl-C
async fn cancel_on_ctrl_c(cancellation: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received, stopping search");
            cancellation.cancel();
        }
        Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
    }
}

/// Log search events until the search ends
async fn report_events(mut events: mpsc::UnboundedReceiver<SearchEvent>, expected_attempts: f64) {
    while let Some(event) = events.recv().await {
        match event {
            SearchEvent::Started { difficulty, workers } => {
                info!(
                    "Search started with {} workers (difficulty {}, ~{:.0} expected attempts)",
                    workers, difficulty, expected_attempts
                );
            }
            SearchEvent::Progress(stats) => {
                info!(
                    "Progress: {} hashes in {} ({}, {:.1}% of expected work)",
                    stats.hashes,
                    format_duration(stats.elapsed),
                    format_hash_rate(stats.hash_rate),
                    percentage_of_expected(stats.hashes, expected_attempts)
                );
            }
            SearchEvent::Found(result) => {
                info!("Found nonce {} ({})", result.nonce(), result.digest());
            }
            SearchEvent::Stopped { reason, stats } => {
                info!("Search stopped ({:?}) after {} hashes", reason, stats.hashes);
            }
        }
    }
}

/// Print the human-readable summary
fn print_outcome(outcome: &pow_miner::Result<MiningResult>) {
    match outcome {
        Ok(result) => {
            println!();
            println!("--- BLOCK FOUND ---");
            println!("Nonce      : {}", result.nonce());
            println!("Hash       : {}", result.digest());
            println!("Time taken : {}", format_duration(result.elapsed()));
            println!("Attempts   : {}", result.attempts());
            println!("Hashes     : {} on {} workers", result.hashes(), result.workers());
            println!("Hash rate  : {}", format_hash_rate(result.hash_rate()));
        }
        Err(e) => {
            println!();
            match e {
                Error::Cancelled { .. } | Error::TimedOut { .. } => {
                    println!("No result within constraints: {}", e);
                }
                _ => println!("Mining failed: {}", e),
            }
            if let Some(stats) = e.stats() {
                println!(
                    "Hashes tried: {} in {}",
                    stats.hashes,
                    format_duration(stats.elapsed)
                );
            }
        }
    }
}

/// Print current configuration
fn print_configuration(config: &Config) -> pow_miner::Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}

/// Process exit code for a failed run
fn exit_code(error: &Error) -> ExitCode {
    ExitCode::from(exit_status(error))
}

fn exit_status(error: &Error) -> u8 {
    match error {
        Error::InvalidDifficulty { .. } | Error::Config { .. } => 2,
        Error::Cancelled { .. } | Error::TimedOut { .. } => 3,
        Error::NonceExhausted { .. } => 4,
        _ => 1,
    }
}
