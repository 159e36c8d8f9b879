//! Periodic driver — calls [`SchedulerEngine::tick`] at a fixed cadence.
//!
//! Sweeps never overlap: the engine is shared behind a tokio `Mutex` and each
//! tick only proceeds if it can take the lock without waiting. A tick that
//! finds a sweep still in progress is skipped. The sweep itself runs on the
//! blocking pool because work functions are synchronous.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tickwork_core::{Result, TickworkError};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{SchedulerEngine, TickReport};

/// Engine handle shared between the driver and callers polling task state.
pub type SharedEngine = Arc<Mutex<SchedulerEngine>>;

/// Wrap an engine for use with the driver.
pub fn shared(engine: SchedulerEngine) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Run one sweep at the current time. Returns `None` when the tick was
/// skipped because another sweep holds the engine.
pub async fn run_tick(engine: &SharedEngine) -> Option<TickReport> {
    let Ok(mut guard) = Arc::clone(engine).try_lock_owned() else {
        tracing::warn!("⏭️ Previous sweep still running, skipping tick");
        return None;
    };

    let now = Utc::now();
    match tokio::task::spawn_blocking(move || guard.tick(now)).await {
        Ok(report) => {
            if !report.is_idle() {
                tracing::debug!(
                    "🧹 Sweep done: {} ran ({} ok, {} failed), {} blocked",
                    report.executed.len(),
                    report.succeeded,
                    report.failed,
                    report.blocked.len()
                );
            }
            Some(report)
        }
        Err(e) => {
            tracing::error!("❌ Sweep task aborted: {e}");
            None
        }
    }
}

/// Scheduler loop. Ticks every `interval` until `shutdown` turns `true` or
/// its sender is dropped. Awaiting this future is the blocking mode.
pub async fn run_scheduler(
    engine: SharedEngine,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if interval.is_zero() {
        return Err(TickworkError::validation("tick interval must be > 0"));
    }

    tracing::info!("⏰ Scheduler started (check every {:?})", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick(&engine).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("🛑 Scheduler stopped");
    Ok(())
}

/// Handle to a scheduler loop running in the background.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<Result<()>>,
}

impl SchedulerHandle {
    /// Ask the loop to stop after the current sweep.
    pub fn stop(&self) {
        self.shutdown_tx.send(true).ok();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to exit.
    pub async fn join(self) -> Result<()> {
        self.join
            .await
            .map_err(|e| TickworkError::Other(format!("scheduler loop panicked: {e}")))?
    }

    /// Stop and wait.
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.join().await
    }
}

/// Spawn the scheduler loop as a background tokio task (non-blocking mode).
pub fn spawn_scheduler(engine: SharedEngine, interval: Duration) -> Result<SchedulerHandle> {
    if interval.is_zero() {
        return Err(TickworkError::validation("tick interval must be > 0"));
    }
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(run_scheduler(engine, interval, shutdown_rx));
    Ok(SchedulerHandle { shutdown_tx, join })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Every, Task, TaskArgs, TaskOutcome, TaskStatus};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_run_tick_executes_due_tasks() {
        let mut engine = SchedulerEngine::new();
        engine.register(Task::interval(Every::hours(1), |_| Ok(json!(1))).with_id("a")).unwrap();
        let engine = shared(engine);

        let report = run_tick(&engine).await.unwrap();
        assert_eq!(report.executed, ["a"]);
        assert_eq!(engine.lock().await.get("a").unwrap().status(), TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_run_tick_skips_while_engine_busy() {
        let engine = shared(SchedulerEngine::new());
        let _held = engine.lock().await;
        assert!(run_tick(&engine).await.is_none());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let engine = shared(SchedulerEngine::new());
        assert!(spawn_scheduler(engine.clone(), Duration::ZERO).is_err());

        let (_tx, rx) = watch::channel(false);
        assert!(run_scheduler(engine, Duration::ZERO, rx).await.is_err());
    }

    #[tokio::test]
    async fn test_background_loop_runs_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut engine = SchedulerEngine::new();
        engine
            .register(
                Task::interval(Every::hours(1), move |_: &TaskArgs| -> TaskOutcome {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("tick"))
                })
                .with_id("hourly"),
            )
            .unwrap();
        let engine = shared(engine);

        let handle = spawn_scheduler(engine.clone(), Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        handle.stop();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        handle.join().await.unwrap();

        // Fired on the first tick only; the hour has not elapsed since.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.lock().await.get("hourly").unwrap().history().len(), 1);
    }

    #[tokio::test]
    async fn test_loop_exits_when_sender_dropped() {
        let engine = shared(SchedulerEngine::new());
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn(run_scheduler(engine, Duration::from_millis(10), rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_does_not_start_when_already_stopped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut engine = SchedulerEngine::new();
        engine
            .register(Task::interval(Every::seconds(1), move |_: &TaskArgs| -> TaskOutcome {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(null))
            }))
            .unwrap();

        let (_tx, rx) = watch::channel(true);
        run_scheduler(shared(engine), Duration::from_millis(10), rx).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
