//! launchcast - launch notification dispatcher
//!
//! CLI entry point for the notification daemon and its inspection commands.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use launchcast::cli::{Cli, Command};
use launchcast::config::Config;
use launchcast::daemon::Daemon;
use launchcast::domain::{ClassTable, Event, NotificationClass, format_local_time};
use launchcast::notifier::unix_now;
use launchcast::store::{SqliteStore, Store};
use launchcast::tracker::EventStore;
use launchcast::transport::create_transport;

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("launchcast")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Log to file, keep stdout for command output
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("launchcast.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(db = %config.storage.db_path.display(), "launchcast loaded config");

    match cli.command {
        Command::Run { dry_run } => cmd_run(config, dry_run).await,
        Command::Next => cmd_next(&config).await,
        Command::Events => cmd_events(&config).await,
    }
}

/// Run the daemon until SIGINT/SIGTERM
async fn cmd_run(config: Config, dry_run: bool) -> Result<()> {
    if !dry_run {
        config.validate()?;
    }

    let mut store = SqliteStore::open(&config.storage.db_path).context("Failed to open store")?;
    if dry_run {
        store = store.scratch_copy().context("Failed to copy store for dry run")?;
        info!("Dry run: notification state is kept in memory only");
    }
    let store = Arc::new(store);
    let transport = create_transport(&config.transport, dry_run).context("Failed to create transport")?;
    let daemon = Daemon::new(config, store.clone(), store, transport, dry_run);

    let cancel = CancellationToken::new();
    let daemon_handle = tokio::spawn(daemon.run(cancel.clone()));

    println!("{} launchcast running{}", "✓".green(), if dry_run { " (dry run)" } else { "" });
    wait_for_shutdown().await?;
    cancel.cancel();

    let stats = daemon_handle.await.context("Daemon task panicked")??;
    println!(
        "Stopped: {} sent, {} failed, {} deleted",
        stats.sent, stats.failed, stats.deleted
    );
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
    }

    Ok(())
}

/// Load tracked events the way the daemon sees them at startup
async fn load_events(config: &Config) -> Result<EventStore> {
    let store = SqliteStore::open(&config.storage.db_path).context("Failed to open store")?;
    let events = EventStore::new(Arc::new(ClassTable::standard()), config.scheduler.clone());
    let listing = store.refresh().await.context("Failed to read events")?;
    events.update(listing, unix_now()).await;
    Ok(events)
}

/// Preview the next due notification
async fn cmd_next(config: &Config) -> Result<()> {
    let events = load_events(config).await?;
    let now = unix_now();

    let Some(due) = events.find_next(now).await.due else {
        println!("{}", "Nothing due".dimmed());
        return Ok(());
    };

    let wait = compose_wait(due.send_time - now);
    println!(
        "{} {} at {} ({})",
        "Next:".bold(),
        due.class.to_string().cyan(),
        format_local_time(due.send_time, 0),
        wait
    );
    for entry in &due.entries {
        let name = events.get(&entry.event_id).await.map(|e| e.name).unwrap_or_default();
        println!("  {} {} [{}]", entry.event_id.yellow(), name, entry.class);
    }
    Ok(())
}

fn compose_wait(secs: i64) -> String {
    if secs <= 0 {
        "now".to_string()
    } else {
        format!("in {}", launchcast::notifier::compose::format_delay(secs))
    }
}

/// List tracked events
async fn cmd_events(config: &Config) -> Result<()> {
    let events = load_events(config).await?;
    let snapshot = events.snapshot().await;
    if snapshot.is_empty() {
        println!("{}", "No tracked events".dimmed());
        return Ok(());
    }

    for event in snapshot {
        print_event(&event);
    }
    Ok(())
}

fn print_event(event: &Event) {
    let classes: Vec<String> = NotificationClass::ALL
        .iter()
        .map(|class| {
            let label = class.to_string();
            if event.is_sent(*class) {
                format!("{}", label.green())
            } else {
                format!("{}", label.dimmed())
            }
        })
        .collect();
    let status = if event.live { "live".green() } else { "tbd".yellow() };

    println!(
        "{} {} [{}] NET {} {}",
        event.id.cyan(),
        event.name.bold(),
        status,
        format_local_time(event.net, 0),
        classes.join(" ")
    );
}
