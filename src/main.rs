//! `market-dashboard` command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use market_dashboard::config::{init_logging, AppConfig};
use market_dashboard::pipeline;
use market_dashboard::report;
use market_dashboard::sources::YahooClient;

#[derive(Parser, Debug)]
#[command(name = "market-dashboard")]
#[command(version)]
#[command(about = "Market report generator and scheduled HTML dashboard", long_about = None)]
struct Cli {
    /// Extra config file layered over config/default and config/local
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the dashboard once
    Run {
        /// Send the dashboard to Telegram afterwards
        #[arg(long)]
        push: bool,
    },

    /// Generate and push the dashboard at every scheduled time
    Schedule,

    /// Build the volume profile dashboard
    VolumeProfile {
        /// Send the result to Telegram
        #[arg(long)]
        send: bool,

        /// Keep rebuilding every `volume_profile.push_every_hours`
        #[arg(long = "loop")]
        repeat: bool,
    },

    /// Recompute annualized volatility and drift in the sector list
    RefreshVol,

    /// Fit factor exposures for the stock list
    Factors,

    /// Serve the generated reports over HTTP
    #[cfg(feature = "dashboard")]
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let cfg = AppConfig::load_with(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { push } => {
            let outcome = pipeline::run_pipeline_with_retries(&cfg, None, push).await?;
            info!(
                run_id = %outcome.run_id,
                file = %outcome.file_name(),
                skipped = ?outcome.skipped,
                "✅ Dashboard run complete"
            );
        }
        Commands::Schedule => pipeline::run_scheduler(&cfg).await?,
        Commands::VolumeProfile { send, repeat } => {
            if repeat {
                pipeline::run_volume_profile_loop(&cfg).await?;
            } else {
                let path = pipeline::run_volume_profile(&cfg, send).await?;
                info!(path = %path.display(), "✅ Volume profile complete");
            }
        }
        Commands::RefreshVol => {
            let yahoo = YahooClient::new(&cfg.sources)?;
            let updated = report::vol_refresh::refresh_volatility(&cfg, &yahoo).await?;
            info!(updated, "✅ Volatility metrics refreshed");
        }
        Commands::Factors => {
            let yahoo = YahooClient::new(&cfg.sources)?;
            let artifact = report::factors::generate(&cfg, &yahoo).await?;
            let path = artifact
                .write_to(&cfg.output_dir())
                .context("Failed writing factor report")?;
            info!(path = %path.display(), "✅ Factor report written");
        }
        #[cfg(feature = "dashboard")]
        Commands::Serve => market_dashboard::dashboard::start_server(&cfg).await?,
    }

    Ok(())
}
