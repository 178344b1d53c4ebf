//! Command implementations for the notes daemon.
//!
//! - serve: startup auto-index, then the scheduled reindex until a signal
//! - search/index/remove/rename: one-shot operations on the shared index
//! - reindex/stats/optimize/clear: maintenance

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use notes_indexing::{NoteSearch, ReindexSummary};
use notes_scheduler::{register_reindex_job, ReindexJobConfig, SchedulerConfig, SchedulerService};
use notes_types::{SearchResponse, Settings};

use crate::cli::{Cli, SearchArgs};

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(index_dir) = &cli.index_dir {
        settings.index_dir = index_dir.clone();
    }
    if let Some(vaults_root) = &cli.vaults_root {
        settings.vaults_root = vaults_root.clone();
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over `log_level`.
///
/// Logs go to stderr so `search --json` output stays machine-readable.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open the index and vault store named by `settings`.
pub fn open_search(settings: &Settings) -> Result<Arc<NoteSearch>> {
    info!(
        index_dir = %settings.expanded_index_dir().display(),
        vaults_root = %settings.expanded_vaults_root().display(),
        "Opening search index"
    );
    let search = NoteSearch::from_settings(settings).context("Failed to open search index")?;
    Ok(Arc::new(search))
}

/// Whether `serve` should reindex before the first scheduled run.
pub fn needs_startup_reindex(search: &NoteSearch, forced: bool) -> bool {
    forced || search.is_empty()
}

/// Run the daemon until Ctrl+C or SIGTERM.
///
/// 1. Open the index
/// 2. Auto-index in the background when the index is empty or forced
/// 3. Register the cron reindex job and start the scheduler
/// 4. On a signal, cancel running work and shut the scheduler down
pub async fn serve(settings: Settings, reindex_on_startup: bool) -> Result<()> {
    let search = open_search(&settings)?;

    let scheduler_config = SchedulerConfig::from_reindex_settings(&settings.reindex);
    let mut scheduler = SchedulerService::new(scheduler_config)
        .await
        .context("Failed to create scheduler")?;
    let shutdown = scheduler.shutdown_token();

    let forced = settings.reindex.on_startup || reindex_on_startup;
    let startup = if needs_startup_reindex(&search, forced) {
        info!(docs = search.num_docs(), forced, "Running startup reindex");
        let search = search.clone();
        let cancel = shutdown.clone();
        Some(tokio::task::spawn_blocking(move || search.reindex_all(&cancel)))
    } else {
        None
    };

    register_reindex_job(
        &scheduler,
        search.clone(),
        ReindexJobConfig::from_settings(&settings.reindex),
    )
    .await
    .context("Failed to register reindex job")?;
    scheduler.start().await.context("Failed to start scheduler")?;

    info!(
        docs = search.num_docs(),
        schedule = %settings.reindex.schedule,
        timezone = %settings.reindex.timezone,
        "Notes daemon running"
    );

    shutdown_signal().await;

    scheduler.shutdown().await.context("Failed to stop scheduler")?;
    if let Some(handle) = startup {
        match handle.await {
            Ok(Ok(summary)) => info!(state = %summary.state, "Startup reindex finished"),
            Ok(Err(e)) => warn!(error = %e, "Startup reindex failed"),
            Err(e) => error!(error = %e, "Startup reindex task panicked"),
        }
    }

    for status in scheduler.registry().get_all_status() {
        info!(
            job = %status.job_name,
            runs = status.run_count,
            errors = status.error_count,
            skips = status.skip_count,
            "Job totals"
        );
    }
    info!("Notes daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Run one search and print the result.
pub fn search(settings: &Settings, args: &SearchArgs) -> Result<()> {
    let search = open_search(settings)?;
    let request = args.to_request(settings.search.default_limit);
    let response = search.search(&request).context("Search failed")?;
    print!("{}", format_response(&response, args.json)?);
    Ok(())
}

/// Render hits as `score<TAB>path` lines plus a footer, or as JSON.
pub fn format_response(response: &SearchResponse, json: bool) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(response)?;
        out.push('\n');
        return Ok(out);
    }

    let mut out = String::new();
    for hit in &response.hits {
        writeln!(out, "{:.3}\t{}", hit.score, hit.path)?;
    }
    writeln!(
        out,
        "-- {} of {} matches ({:.1} ms)",
        response.hits.len(),
        response.total,
        response.elapsed_ms
    )?;
    Ok(out)
}

pub fn index(settings: &Settings, path: &str) -> Result<()> {
    let search = open_search(settings)?;
    if !search.index_stored(path) {
        bail!("Failed to index {path}");
    }
    println!("Indexed {path}");
    Ok(())
}

pub fn remove(settings: &Settings, path: &str) -> Result<()> {
    let search = open_search(settings)?;
    if !search.remove(path) {
        bail!("Failed to remove {path}");
    }
    println!("Removed {path}");
    Ok(())
}

pub fn rename(settings: &Settings, old_path: &str, new_path: &str) -> Result<()> {
    let search = open_search(settings)?;
    let file = search
        .store()
        .read(new_path)
        .with_context(|| format!("Failed to read {new_path}"))?;
    if !search.rename(old_path, new_path, &file.content) {
        bail!("Failed to rename {old_path} to {new_path}");
    }
    println!("Renamed {old_path} -> {new_path}");
    Ok(())
}

/// Reindex every vault; Ctrl+C stops after the current document.
pub async fn reindex(settings: &Settings) -> Result<()> {
    let search = open_search(settings)?;
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling reindex");
            on_signal.cancel();
        }
    });

    let run = tokio::task::spawn_blocking(move || search.reindex_all(&cancel)).await;
    watcher.abort();

    let summary: ReindexSummary = run
        .context("Reindex task panicked")?
        .context("Reindex failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn stats(settings: &Settings, detailed: bool) -> Result<()> {
    let search = open_search(settings)?;
    let rendered = if detailed {
        serde_json::to_string_pretty(&search.detailed_stats())?
    } else {
        serde_json::to_string_pretty(&search.stats().context("Failed to read index stats")?)?
    };
    println!("{rendered}");
    Ok(())
}

pub fn optimize(settings: &Settings) -> Result<()> {
    let search = open_search(settings)?;
    if !search.optimize() {
        bail!("Optimize failed");
    }
    println!("Index optimized");
    Ok(())
}

pub fn clear(settings: &Settings, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Refusing to clear the index without --yes");
    }
    let search = open_search(settings)?;
    if !search.clear() {
        bail!("Clear failed");
    }
    println!("Index cleared");
    Ok(())
}
