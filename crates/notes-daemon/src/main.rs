//! Notes search daemon
//!
//! Full-text search over per-user markdown vaults.
//!
//! # Usage
//!
//! ```bash
//! notes-daemon serve [--reindex-on-startup]
//! notes-daemon search <words...> [--regex P --flags F] [--phrase] [--tag T] [--path P]...
//! notes-daemon index|remove <path>
//! notes-daemon rename <old> <new>
//! notes-daemon reindex | stats [--detailed] | optimize | clear --yes
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/notes-search/config.toml)
//! 3. `--config` file
//! 4. Environment variables (NOTES_*, nested keys with `__`)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use notes_daemon::{commands, init_logging, load_settings, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    match &cli.command {
        Commands::Serve { reindex_on_startup } => {
            commands::serve(settings, *reindex_on_startup).await?;
        }
        Commands::Search(args) => commands::search(&settings, args)?,
        Commands::Index { path } => commands::index(&settings, path)?,
        Commands::Remove { path } => commands::remove(&settings, path)?,
        Commands::Rename { old_path, new_path } => {
            commands::rename(&settings, old_path, new_path)?;
        }
        Commands::Reindex => commands::reindex(&settings).await?,
        Commands::Stats { detailed } => commands::stats(&settings, *detailed)?,
        Commands::Optimize => commands::optimize(&settings)?,
        Commands::Clear { yes } => commands::clear(&settings, *yes)?,
    }

    Ok(())
}
