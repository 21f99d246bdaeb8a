use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;

use transatlantic::cli::{Cli, Command};
use transatlantic::exec::{ProcessRunner, Runner};
use transatlantic::logging::init_logging;
use transatlantic::speed::UNIT;
use transatlantic::{
    Config, Diff, EngineOptions, FileInventory, Gateway, PassReport, SpeedTracker, TransferEngine,
    TransferState,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_logging(
        cli.verbose,
        Some(&config.log_file()),
        &config.logging.level,
        config.logging.format,
    )
    .context("Failed to set up logging")?;

    match cli.subcommand() {
        Command::Speed { reset } => show_speed(&config, reset),
        Command::Diff => {
            let mut engine = build_engine(&config, Gateway::disabled());
            engine.refresh().await?;
            print_diff(&engine.diff().await);
            Ok(())
        }
        Command::Run => {
            let runner: Arc<dyn Runner> = Arc::new(ProcessRunner);
            let gateway = Gateway::connect(&config.download_client, runner).await;
            let mut engine = build_engine(&config, gateway);
            let report = engine.run().await?;
            print_report(&report, engine.speed());
            Ok(())
        }
    }
}

fn build_engine(config: &Config, gateway: Gateway) -> TransferEngine {
    let runner: Arc<dyn Runner> = Arc::new(ProcessRunner);

    let satellite = FileInventory::new(config.satellite_location(), runner.clone());
    let local = FileInventory::new(config.local_location(), runner.clone());
    let speed = SpeedTracker::load(config.speed_file())
        .with_outlier_factor(config.transfer.outlier_factor);

    TransferEngine::new(satellite, local, speed, gateway, runner).with_options(EngineOptions::new(
        config.transfer.create_video_folders,
        &config.transfer.video_extensions,
    ))
}

fn show_speed(config: &Config, reset: bool) -> Result<()> {
    let mut tracker = SpeedTracker::load(config.speed_file());

    if reset {
        tracker.reset()?;
        println!("Speed estimate cleared ({})", tracker.path().display());
        return Ok(());
    }

    match tracker.estimate() {
        Some(speed) => println!("{} {}", speed, UNIT),
        None => println!("No speed estimate yet"),
    }
    Ok(())
}

fn print_diff(diff: &Diff) {
    match diff {
        Diff::NoNewFiles => println!("No new files"),
        Diff::Files(files) => {
            println!("{} new file(s):", files.len());
            for file in files {
                println!("  {}", file);
            }
        }
    }
}

fn print_report(report: &PassReport, speed: &SpeedTracker) {
    for record in &report.records {
        let status = match record.state {
            TransferState::Removed => "ok".green(),
            TransferState::Succeeded => "copied".green(),
            TransferState::Skipped => "skipped".dimmed(),
            TransferState::RemoveFailed => "copied, not removed".yellow(),
            TransferState::TransferFailed => "failed".red(),
            _ => "?".normal(),
        };
        match &record.error {
            Some(error) => println!("  {:<20} {} ({})", status, record.file.name, error),
            None => println!("  {:<20} {}", status, record.file.name),
        }
    }

    println!(
        "{} remote, {} local, {} new, {} attempted",
        report.satellite_files, report.local_files, report.candidates, report.attempted
    );
    println!(
        "Transferred: {}  Failed: {}  Skipped: {}",
        report.transferred.to_string().green(),
        report.transfer_failed.to_string().red(),
        report.skipped
    );
    println!(
        "Removed from client: {}  Removal failed: {}",
        report.removed.to_string().green(),
        report.remove_failed.to_string().yellow()
    );
    if let Some(estimate) = speed.estimate() {
        println!("Average speed: {} {}", estimate, UNIT);
    }
}
