//! Cadastre CLI - operator interface for the building registry.
//!
//! # Usage
//!
//! ```bash
//! # List the registry as a tree
//! cadastre tree
//!
//! # Add a foundation with its first building
//! cadastre add-foundation "Fondation Alpha" "Bâtiment 1"
//!
//! # Change a building id (moves its data directory)
//! cadastre change-building-id fondation-alpha batiment-1 batiment-alpha-1
//!
//! # Check registry/disk consistency, then repair
//! cadastre audit
//! cadastre normalize --run
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

mod commands;

#[derive(Parser)]
#[command(name = "cadastre")]
#[command(about = "Cadastre - file-backed registry of foundations and buildings", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data root (overrides CADASTRE_DATA_ROOT)
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Client (tenant) id
    #[arg(long, global = true)]
    client: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the registry as a tree of foundations and buildings
    Tree,

    /// List registry backups, newest first
    Backups,

    /// Restore the registry from a backup
    Restore {
        /// Backup file name as shown by `backups`
        backup_id: String,
    },

    /// Add a foundation with its first building
    AddFoundation {
        /// Foundation display name
        foundation_name: String,

        /// First building's display name
        building_name: String,
    },

    /// Add a building under an existing foundation
    AddBuilding {
        /// Foundation id
        foundation_id: String,

        /// Building display name
        building_name: String,
    },

    /// Rename a foundation (display name; the id is unchanged)
    RenameFoundation {
        foundation_id: String,
        new_name: String,
    },

    /// Rename a building (display name; the id is unchanged)
    RenameBuilding {
        foundation_id: String,
        id: String,
        new_name: String,
    },

    /// Delete a building, archiving its data directories
    DeleteBuilding {
        foundation_id: String,
        id: String,

        /// Erase the data directories after archiving
        #[arg(long)]
        erase: bool,

        /// Report the effect without mutating anything
        #[arg(long)]
        dry: bool,
    },

    /// Delete a foundation and all of its buildings
    DeleteFoundation {
        foundation_id: String,

        /// Erase the data directories after archiving
        #[arg(long)]
        erase: bool,

        /// Report the effect without mutating anything
        #[arg(long)]
        dry: bool,
    },

    /// Change a building's id, moving its data and recording an alias
    ChangeBuildingId {
        foundation_id: String,
        old_id: String,
        new_id: String,
    },

    /// Change a foundation's id, moving its directory tree
    ChangeFoundationId {
        old_id: String,
        new_id: String,
    },

    /// Report drift between the registry and the directory tree
    Audit,

    /// Move misplaced building data back to its canonical path
    Normalize {
        /// Perform the moves (default is a dry run)
        #[arg(long)]
        run: bool,
    },

    /// Archive on-disk building directories absent from the registry
    ArchiveStrays {
        /// Perform the moves (default is a dry run)
        #[arg(long)]
        run: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = cadastre_core::StoreConfig::from_env();
    if let Some(root) = cli.data_root {
        config.data_root = root;
    }
    if let Some(client) = cli.client {
        config = config.with_client_id(client);
    }
    config.ensure_layout()?;
    let config = std::sync::Arc::new(config);

    match cli.command {
        Commands::Tree => commands::tree(config).await?,
        Commands::Backups => commands::backups(config).await?,
        Commands::Restore { backup_id } => commands::restore(config, backup_id).await?,
        Commands::AddFoundation {
            foundation_name,
            building_name,
        } => commands::add_foundation(config, foundation_name, building_name).await?,
        Commands::AddBuilding {
            foundation_id,
            building_name,
        } => commands::add_building(config, foundation_id, building_name).await?,
        Commands::RenameFoundation {
            foundation_id,
            new_name,
        } => commands::rename_foundation(config, foundation_id, new_name).await?,
        Commands::RenameBuilding {
            foundation_id,
            id,
            new_name,
        } => commands::rename_building(config, foundation_id, id, new_name).await?,
        Commands::DeleteBuilding {
            foundation_id,
            id,
            erase,
            dry,
        } => commands::delete_building(config, foundation_id, id, erase, dry).await?,
        Commands::DeleteFoundation {
            foundation_id,
            erase,
            dry,
        } => commands::delete_foundation(config, foundation_id, erase, dry).await?,
        Commands::ChangeBuildingId {
            foundation_id,
            old_id,
            new_id,
        } => commands::change_building_id(config, foundation_id, old_id, new_id).await?,
        Commands::ChangeFoundationId { old_id, new_id } => {
            commands::change_foundation_id(config, old_id, new_id).await?
        }
        Commands::Audit => commands::audit(config).await?,
        Commands::Normalize { run } => commands::normalize(config, run).await?,
        Commands::ArchiveStrays { run } => commands::archive_strays(config, run).await?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new("cadastre=debug,cadastre_store=debug,cadastre_core=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cadastre=info,cadastre_store=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
