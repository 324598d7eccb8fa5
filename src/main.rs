#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use booth_price_tracker::application::{CrawlJob, SaleBackfill};
use booth_price_tracker::infrastructure::logging::{init_logging_with_config, log_system_info};
use booth_price_tracker::infrastructure::{ConfigManager, CorruptRecordPolicy, JsonProductStore};

#[derive(Parser, Debug)]
#[command(name = "booth-price-tracker", version, about = "Time-boxed BOOTH price history crawler")]
struct Cli {
    /// Configuration file (default: user config dir)
    #[arg(long, global = true, env = "BOOTH_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run one time-boxed crawl (default)
    Crawl,
    /// Flag stored price drops as sales
    BackfillSales {
        /// Count without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print when a crawl started now would stop
    StopTime,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let config = manager.load_validated().await?;
    let command = cli.command.unwrap_or(Command::Crawl);

    if command == Command::StopTime {
        let job = CrawlJob::new(config)?;
        println!("{}", job.stop_time(Utc::now()).with_timezone(&job.schedule().offset).to_rfc3339());
        return Ok(());
    }

    init_logging_with_config(&config.logging, config.schedule.offset()?)?;
    log_system_info();
    info!("Using configuration {:?}", manager.config_path());

    match command {
        Command::BackfillSales { dry_run } => {
            // Never move unreadable files aside during maintenance
            let store = JsonProductStore::new(&config.storage.data_dir, CorruptRecordPolicy::Skip);
            SaleBackfill::new(Arc::new(store)).dry_run(dry_run).run().await?;
        }
        Command::Crawl | Command::StopTime => {
            let job = CrawlJob::new(config)?;
            let shutdown = CancellationToken::new();
            tokio::spawn(watch_ctrl_c(shutdown.clone()));

            // Crawl-level problems are in the report, not the exit status
            let report = job.run(shutdown).await?;
            info!("Run {} ended: {:?}", report.run_id, report.outcome);
        }
    }
    Ok(())
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Shutdown requested, stopping at the next page boundary");
        shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("booth-price-tracker").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn crawl_is_the_default_command() {
        let cli = parse(&["--config", "/etc/booth.json"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/booth.json")));
        assert_eq!(parse(&["crawl"]).unwrap().command, Some(Command::Crawl));
    }

    #[test]
    fn dry_run_belongs_to_backfill() {
        assert_eq!(
            parse(&["backfill-sales", "--dry-run"]).unwrap().command,
            Some(Command::BackfillSales { dry_run: true })
        );
        assert!(parse(&["crawl", "--dry-run"]).is_err());
    }

    #[test]
    fn config_is_accepted_after_the_subcommand() {
        let cli = parse(&["stop-time", "--config", "c.json"]).unwrap();
        assert_eq!(cli.command, Some(Command::StopTime));
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(parse(&["crawl", "stop-time"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }
}
