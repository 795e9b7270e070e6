//! Command-line host for broadcast campaigns
//!
//! Campaigns are read from RON files and run against dry-run senders that
//! validate each recipient and log the message instead of sending it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use herald::{CampaignFile, Herald, HeraldConfig};
use herald_common::logging;
use herald_delivery::CampaignStatus;

/// Broadcast campaigns over email and WhatsApp
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Run broadcast campaigns", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $HERALD_CONFIG, ./herald.config.ron,
    /// then /etc/herald/herald.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a campaign to the end; CTRL+C cancels it
    Run {
        /// Campaign file (RON)
        campaign: PathBuf,
    },
    /// Validate a campaign file without sending anything
    Check {
        /// Campaign file (RON)
        campaign: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { campaign } => {
            let config = HeraldConfig::load(cli.config.as_deref())?;
            let file = CampaignFile::from_path(&campaign)?;

            let herald = Herald::new(&config);
            let campaign_id = herald.submit(file).await?;
            let snapshot = herald.run(&campaign_id).await?;

            println!("Campaign {campaign_id}: {}", snapshot.status);
            println!(
                "  sent {} / failed {} / total {} ({:.1}%)",
                snapshot.sent,
                snapshot.failed,
                snapshot.total,
                snapshot.percentage()
            );
            if snapshot.unrecorded > 0 {
                println!("  {} outcome(s) not recorded", snapshot.unrecorded);
            }

            if snapshot.status == CampaignStatus::Failed {
                let pending = herald.pending(&campaign_id).await?;
                println!("  {} recipient(s) still pending", pending.len());
                anyhow::bail!(
                    "Campaign failed: {}",
                    snapshot.failure_reason.as_deref().unwrap_or("unknown reason")
                );
            }
        }

        Commands::Check { campaign } => {
            let report = CampaignFile::from_path(&campaign)?.check();

            println!(
                "{} recipient(s) listed, {} unique",
                report.listed, report.unique
            );
            for recipient in &report.invalid {
                println!("  invalid: {recipient}");
            }
            if !report.sender_valid {
                println!("  sender identity missing or invalid");
            }

            if !report.is_startable() {
                anyhow::bail!("Campaign cannot be started");
            }
        }
    }

    Ok(())
}
