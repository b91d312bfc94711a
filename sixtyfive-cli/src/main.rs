//! Sixtyfive: save-data sync for games and other applications.
//!
//! # Usage
//!
//! ```text
//! sixtyfive                      # reconcile everything, then watch processes
//! sixtyfive watch                # same as above
//! sixtyfive list
//! sixtyfive path <APP>
//! sixtyfive push|pull|sync <APP>
//! sixtyfive add <APP> <PATH>
//! sixtyfive remove <APP>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{apps::AddArgs, AppArg};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sixtyfive",
    version,
    about = "Keep application save data in sync across machines",
    long_about = None,
)]
struct Cli {
    /// Defaults to `watch` when omitted.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show tracked applications and when this host last synced them.
    List,

    /// Print the expanded local save path of an application.
    Path(AppArg),

    /// Upload the local save data of an application.
    Push(AppArg),

    /// Restore the remote save data of an application.
    Pull(AppArg),

    /// Reconcile one application (pull, push, or nothing).
    Sync(AppArg),

    /// Track an application, replacing any existing entry.
    Add(AddArgs),

    /// Stop tracking an application.
    Remove(AppArg),

    /// Reconcile every application, then back up after each process exit.
    Watch,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Watch) {
        Commands::List => commands::apps::list(),
        Commands::Path(app) => commands::apps::path(app),
        Commands::Push(app) => commands::transfer::push(app),
        Commands::Pull(app) => commands::transfer::pull(app),
        Commands::Sync(app) => commands::transfer::sync(app),
        Commands::Add(args) => args.run(),
        Commands::Remove(app) => commands::apps::remove(app),
        Commands::Watch => commands::watch::run(),
    }
}
