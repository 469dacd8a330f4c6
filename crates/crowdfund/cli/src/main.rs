//! Crowdfund CLI
//!
//! Runs scripted campaign simulations against an in-process ledger and
//! prints the resulting campaigns, payouts and events.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crowdfund_ledger::{BroadcastSink, LedgerConfig, NotificationSink};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;
mod script;

use output::OutputFormat;
use script::{Script, Simulation};

#[derive(Parser)]
#[command(name = "crowdfund")]
#[command(about = "Goal-based crowdfunding escrow ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Ledger configuration file (TOML)
    #[arg(short, long, env = "CROWDFUND_CONFIG", default_value = "crowdfund.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "CROWDFUND_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation script
    Simulate {
        /// Script path
        #[arg(short, long)]
        script: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,

        /// Stream events to stderr while the script runs
        #[arg(long)]
        follow: bool,

        /// Exit with an error if any step was rejected
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective ledger configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = LedgerConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Simulate {
            script,
            output,
            follow,
            strict,
        } => simulate(config, &script, output, follow, strict).await,
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn simulate(
    config: LedgerConfig,
    path: &Path,
    format: OutputFormat,
    follow: bool,
    strict: bool,
) -> anyhow::Result<()> {
    let script = Script::load(path)?;
    let config = script.ledger.clone().unwrap_or(config);
    let start = script.start.unwrap_or_else(chrono::Utc::now);

    let (observer, follower) = if follow {
        let broadcast = Arc::new(BroadcastSink::new(config.event_buffer));
        let mut rx = broadcast.subscribe();
        let follower = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => eprintln!("{}", output::event_line(&event)),
                    Err(RecvError::Lagged(skipped)) => {
                        eprintln!("... {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        (
            Some(broadcast as Arc<dyn NotificationSink>),
            Some(follower),
        )
    } else {
        (None, None)
    };

    info!(
        script = %path.display(),
        steps = script.steps.len(),
        mode = ?config.payout_mode,
        "Running simulation"
    );

    let mut simulation = Simulation::new(config, start, observer)?;
    let report = simulation.run(&script.steps).await;
    // Closes the broadcast channel so the follower drains and exits.
    drop(simulation);
    if let Some(follower) = follower {
        follower.await?;
    }

    output::print_report(&report, format)?;

    if strict && report.failures() > 0 {
        anyhow::bail!("{} step(s) rejected", report.failures());
    }
    Ok(())
}
