use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stride_sync::cli::commands::{self, SourceSelection};
use stride_sync::cli::OutputFormat;
use stride_sync::config::Settings;

#[derive(Parser)]
#[command(name = "stride")]
#[command(author, version, about = "Incremental activity cache sync for a running log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to <config dir>/stride/settings.json)
    #[arg(long, global = true, env = "STRIDE_CONFIG")]
    config: Option<PathBuf>,

    /// Cache file to operate on
    #[arg(long, global = true, env = "STRIDE_CACHE")]
    cache: Option<PathBuf>,

    /// Bearer token for the device-sync API
    #[arg(long, global = true, env = "STRIDE_API_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent activities and merge them into the cache
    Sync {
        /// Lookback window in days
        #[arg(short, long)]
        days: Option<u32>,
        /// Fetch and merge without writing the cache
        #[arg(long)]
        dry_run: bool,
        /// Only fetch from the device-sync API
        #[arg(long, conflicts_with = "secondary_only")]
        primary_only: bool,
        /// Only read the historical export
        #[arg(long)]
        secondary_only: bool,
        /// Historical export file
        #[arg(long)]
        archive: Option<PathBuf>,
    },
    /// Backfill per-kilometer splits for recent long runs
    Enrich {
        /// Compute without writing the cache
        #[arg(long)]
        dry_run: bool,
    },
    /// Show cache contents and last sync times
    Status,
    /// Weekly volume report
    Weekly {
        /// Limit to one ISO year
        #[arg(short, long)]
        year: Option<i32>,
    },
    /// Monthly volume report
    Monthly,
    /// Check the cache against the integrity baseline
    Verify {
        /// Save the current state as the new baseline
        #[arg(long)]
        baseline: bool,
    },
    /// Manage cache backups
    Backups {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// List backups, newest first
    List,
    /// Replace the cache with a backup
    Restore {
        /// Backup file name or path
        file: PathBuf,
    },
}

fn load_settings(cli: &Cli) -> stride_sync::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if let Some(cache) = &cli.cache {
        settings.cache_path = Some(cache.clone());
    }
    Ok(settings)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    stride_sync::logging::init(cli.verbose);

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", stride_sync::format_user_error(&e));
            std::process::exit(1);
        }
    };
    let format = cli.format;
    let token = cli.token;

    let result = match cli.command {
        Commands::Sync {
            days,
            dry_run,
            primary_only,
            secondary_only,
            archive,
        } => {
            commands::sync_run(
                settings,
                token,
                days,
                archive,
                SourceSelection::from_flags(primary_only, secondary_only),
                dry_run,
                format,
            )
            .await
        }
        Commands::Enrich { dry_run } => commands::enrich(settings, token, dry_run, format).await,
        Commands::Status => commands::status(settings, format).await,
        Commands::Weekly { year } => commands::weekly(settings, year, format).await,
        Commands::Monthly => commands::monthly(settings, format).await,
        Commands::Verify { baseline } => match commands::verify(settings, baseline, format).await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(2),
            Err(e) => Err(e),
        },
        Commands::Backups { command } => match command {
            BackupCommands::List => commands::list_backups(settings, format).await,
            BackupCommands::Restore { file } => commands::restore_backup(settings, file).await,
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", stride_sync::format_user_error(&e));
        std::process::exit(1);
    }
}
