//! # Tickwork — scheduler demo
//!
//! Registers a small set of demo tasks and drives the scheduler until
//! Ctrl+C (or `--run-for` seconds).
//!
//! Usage:
//!   tickwork                          # Blocking mode, 1s ticks
//!   tickwork --background             # Drive the scheduler from a background task
//!   tickwork --interval-ms 250        # Custom tick interval
//!   tickwork --run-for 40             # Stop after 40 seconds and print a summary

mod demo;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, Utc};
use clap::Parser;
use tickwork_core::TickworkConfig;
use tickwork_scheduler::{SchedulerEngine, SharedEngine, run_scheduler, shared, spawn_scheduler};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tickwork",
    version,
    about = "⏰ Tickwork — in-process task scheduler demo"
)]
struct Cli {
    /// Config file (defaults to ~/.tickwork/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Tick interval in milliseconds (overrides config)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Drive the scheduler from a background task instead of blocking
    #[arg(long)]
    background: bool,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    run_for: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

/// Load the config and describe where it came from. Logging is not up yet,
/// so the source is returned for the caller to log.
fn load_config(path: Option<&str>) -> Result<(TickworkConfig, String)> {
    match path {
        Some(path) => {
            let path = PathBuf::from(expand_path(path));
            Ok((TickworkConfig::load_from(&path)?, path.display().to_string()))
        }
        None => {
            let path = TickworkConfig::default_path();
            let source = if path.exists() {
                path.display().to_string()
            } else {
                "built-in defaults".to_string()
            };
            Ok((TickworkConfig::load()?, source))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_source) = load_config(cli.config.as_deref())?;

    // Initialize logging
    let filter = if cli.verbose {
        "tickwork=debug,tickwork_scheduler=debug,tickwork_core=debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
    tracing::info!("📄 Config: {config_source}");

    // Daily tasks follow the host clock unless the config pins an offset.
    if config.scheduler.utc_offset_minutes.is_none() {
        config.scheduler.utc_offset_minutes = Some(Local::now().offset().local_minus_utc() / 60);
    }

    let mut engine = SchedulerEngine::from_config(&config.scheduler)?;
    demo::register_demo_tasks(&mut engine, Utc::now())?;
    print_tasks(&engine)?;

    let interval = Duration::from_millis(cli.interval_ms.unwrap_or(config.scheduler.tick_interval_ms));
    let engine = shared(engine);
    let stop = stop_signal(cli.run_for);

    if cli.background || !config.scheduler.blocking {
        println!("🚀 Scheduler running in background (Ctrl+C to stop)");
        let handle = spawn_scheduler(engine.clone(), interval)?;
        stop.await;
        handle.shutdown().await?;
    } else {
        println!("🚀 Scheduler running in blocking mode (Ctrl+C to stop)");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = run_scheduler(engine.clone(), interval, shutdown_rx);
        tokio::pin!(scheduler);
        tokio::select! {
            res = &mut scheduler => res?,
            _ = stop => {
                shutdown_tx.send(true).ok();
                scheduler.await?;
            }
        }
    }

    print_summary(&engine).await;
    Ok(())
}

/// Resolves after `run_for` seconds, or on Ctrl+C when unset.
async fn stop_signal(run_for: Option<u64>) {
    match run_for {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("⚠️ Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    }
}

fn print_tasks(engine: &SchedulerEngine) -> Result<()> {
    println!("📋 Registered tasks:");
    for task in engine.tasks() {
        let trigger = engine.trigger(task.id())?;
        let deps = if task.dependencies().is_empty() {
            String::new()
        } else {
            format!(", after {}", task.dependencies().join(", "))
        };
        println!("   - {} ({}{}) [{}]", task.id(), trigger, deps, task.status());
    }
    Ok(())
}

async fn print_summary(engine: &SharedEngine) {
    let engine = engine.lock().await;
    println!("\n📊 Summary:");
    for snap in engine.snapshots() {
        let detail = match (&snap.error, &snap.result) {
            (Some(err), _) if snap.status == tickwork_scheduler::TaskStatus::Failed => {
                format!("error: {err}")
            }
            (_, Some(result)) => format!("result: {result}"),
            _ => "-".to_string(),
        };
        println!(
            "   - {:<26} {:<8} runs={:<3} {}",
            snap.id,
            snap.status.to_string(),
            snap.history.len(),
            detail
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_reports_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = TickworkConfig::default();
        config.scheduler.tick_interval_ms = 250;
        config.save_to(&path).unwrap();

        let path = path.display().to_string();
        let (loaded, source) = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.scheduler.tick_interval_ms, 250);
        assert_eq!(source, path);
    }

    #[test]
    fn test_load_config_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml").display().to_string();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_print_tasks_resolves_every_trigger() {
        let mut engine = SchedulerEngine::new();
        demo::register_demo_tasks(&mut engine, Utc::now()).unwrap();
        print_tasks(&engine).unwrap();
    }
}
