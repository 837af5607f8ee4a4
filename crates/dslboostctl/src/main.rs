//! DSL Boost Control - CLI client for the dslboostd daemon.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dslboostctl::client::DaemonClient;
use dslboostctl::commands;

#[derive(Parser)]
#[command(name = "dslboostctl")]
#[command(about = "DSL line optimization - control client", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon health and the current line status
    Status,

    /// Run the five-phase bypass sequence for a profile
    Optimize {
        /// Optimization profile name
        #[arg(long, default_value = "max_speed")]
        profile: String,
    },

    /// Show recent monitor samples
    History {
        /// How many samples to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the alert log
    Alerts,

    /// Show aggregate performance numbers
    Analytics,

    /// Show the downstream rate trend
    Trend,

    /// Extrapolate the downstream rate
    Predict {
        /// Seconds past the last sample
        #[arg(long, default_value_t = 60)]
        horizon: u64,
    },

    /// Manage device-state snapshots
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Take a snapshot now
    Create,
    /// List snapshots
    List,
    /// Restore a snapshot (the last known good one by default)
    Restore {
        /// Snapshot file name
        #[arg(long)]
        file: Option<String>,
    },
    /// Delete all but the most recent N snapshots
    Prune {
        #[arg(long, default_value_t = 5)]
        keep: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut client = DaemonClient::connect().await?;

    match cli.command {
        Commands::Status => commands::status(&mut client).await,
        Commands::Optimize { profile } => commands::optimize(&mut client, profile).await,
        Commands::History { limit } => commands::history(&mut client, limit).await,
        Commands::Alerts => commands::alerts(&mut client).await,
        Commands::Analytics => commands::analytics(&mut client).await,
        Commands::Trend => commands::trend(&mut client).await,
        Commands::Predict { horizon } => commands::predict(&mut client, horizon).await,
        Commands::Backup { action } => match action {
            BackupAction::Create => commands::backup_create(&mut client).await,
            BackupAction::List => commands::backup_list(&mut client).await,
            BackupAction::Restore { file } => commands::backup_restore(&mut client, file).await,
            BackupAction::Prune { keep } => commands::backup_prune(&mut client, keep).await,
        },
    }
}
