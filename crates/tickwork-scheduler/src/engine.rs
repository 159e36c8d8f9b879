//! Scheduler Engine — decides on every tick which tasks run, runs them,
//! and writes the outcome back into each task.
//!
//! The engine is a plain `&mut self` state machine with no clock of its own:
//! the caller passes `now` into [`SchedulerEngine::tick`]. Periodic driving
//! lives in [`crate::driver`].

use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::Serialize;
use serde_json::Map;
use tickwork_core::{DuplicatePolicy, Result, SchedulerConfig, TickworkError};

use crate::tasks::{Task, TaskArgs, TaskSnapshot, TaskStatus, Trigger, dependency_key};

/// A registered task together with its validated trigger.
struct Entry {
    trigger: Trigger,
    task: Task,
}

/// The scheduler engine — owns registered tasks in registration order.
pub struct SchedulerEngine {
    entries: Vec<Entry>,
    on_duplicate: DuplicatePolicy,
    /// Timezone daily (`at`) triggers are evaluated in.
    offset: FixedOffset,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Ids of tasks executed this tick, in execution order.
    pub executed: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
    /// Ids of tasks that were due but waited on a dependency.
    pub blocked: Vec<String>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.executed.is_empty()
    }
}

impl SchedulerEngine {
    /// Create an empty engine: duplicates replace, daily triggers in UTC.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            on_duplicate: DuplicatePolicy::default(),
            offset: utc(),
        }
    }

    /// Create an engine from the `[scheduler]` config section.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        let mut engine = Self::new().with_duplicate_policy(config.on_duplicate);
        if let Some(minutes) = config.utc_offset_minutes {
            let offset = FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
                TickworkError::config(format!("utc_offset_minutes out of range: {minutes}"))
            })?;
            engine = engine.with_utc_offset(offset);
        }
        Ok(engine)
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = policy;
        self
    }

    /// Evaluate daily triggers and calendar days in `offset`.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.offset
    }

    /// Register a task. Fails if the task does not have exactly one valid
    /// schedule option; in that case nothing is stored.
    pub fn register(&mut self, task: Task) -> Result<&Task> {
        let trigger = task.schedule().trigger()?;
        match self.position(task.id()) {
            Some(_) if self.on_duplicate == DuplicatePolicy::Reject => {
                Err(TickworkError::DuplicateTask(task.id().to_string()))
            }
            Some(idx) => Ok(self.overwrite(idx, Entry { trigger, task })),
            None => Ok(self.push(Entry { trigger, task })),
        }
    }

    /// Insert or overwrite a task regardless of the duplicate policy.
    pub fn replace(&mut self, task: Task) -> Result<&Task> {
        let trigger = task.schedule().trigger()?;
        match self.position(task.id()) {
            Some(idx) => Ok(self.overwrite(idx, Entry { trigger, task })),
            None => Ok(self.push(Entry { trigger, task })),
        }
    }

    /// Remove a task by ID. Tasks depending on it will never become ready
    /// again unless a task with the same id is registered.
    pub fn unregister(&mut self, id: &str) -> Option<Task> {
        let idx = self.position(id)?;
        let entry = self.entries.remove(idx);
        tracing::info!("🗑️ Task removed: {}", id);
        Some(entry.task)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.entries.iter().find(|e| e.task.id() == id).map(|e| &e.task)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Resolved trigger of a registered task.
    pub fn trigger(&self, id: &str) -> Result<Trigger> {
        self.entries
            .iter()
            .find(|e| e.task.id() == id)
            .map(|e| e.trigger)
            .ok_or_else(|| TickworkError::TaskNotFound(id.to_string()))
    }

    /// Registered tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.entries.iter().map(|e| &e.task)
    }

    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.tasks().map(Task::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tick — inspect every task in registration order and run the eligible
    /// ones synchronously. Work-function failures end up in task state and
    /// never abort the sweep.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for idx in 0..self.entries.len() {
            let entry = &self.entries[idx];
            if !should_run(entry.trigger, &entry.task, now, self.offset) {
                continue;
            }
            if !self.deps_ready(&entry.task) {
                tracing::debug!("⏳ Task '{}' is due but waiting on dependencies", entry.task.id());
                report.blocked.push(entry.task.id().to_string());
                continue;
            }

            let args = self.call_args(&entry.task);
            let task = &mut self.entries[idx].task;
            match execute(task, &args, now) {
                TaskStatus::Success => report.succeeded += 1,
                _ => report.failed += 1,
            }
            report.executed.push(task.id().to_string());
        }

        report
    }

    /// Every dependency is registered and has succeeded at least once.
    fn deps_ready(&self, task: &Task) -> bool {
        task.dependencies()
            .iter()
            .all(|dep| self.get(dep).is_some_and(|d| d.last_success_at().is_some()))
    }

    /// The task's own arguments plus one `dep_<id>` keyword per dependency.
    fn call_args(&self, task: &Task) -> TaskArgs {
        let mut args = task.args().clone();
        let dep_kwargs: Map<_, _> = task
            .dependencies()
            .iter()
            .map(|dep| {
                let result = self
                    .get(dep)
                    .and_then(|d| d.result().cloned())
                    .unwrap_or_default();
                (dependency_key(dep), result)
            })
            .collect();
        args.kwargs.extend(dep_kwargs);
        args
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.task.id() == id)
    }

    fn push(&mut self, entry: Entry) -> &Task {
        tracing::info!("📅 Task added: '{}' ({})", entry.task.id(), entry.trigger);
        self.entries.push(entry);
        let idx = self.entries.len() - 1;
        &self.entries[idx].task
    }

    fn overwrite(&mut self, idx: usize, entry: Entry) -> &Task {
        tracing::info!("♻️ Task replaced: '{}' ({})", entry.task.id(), entry.trigger);
        self.entries[idx] = entry;
        &self.entries[idx].task
    }
}

impl Default for SchedulerEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Trigger-specific time condition.
fn should_run(trigger: Trigger, task: &Task, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    match trigger {
        Trigger::Every(every) => match task.last_run_at() {
            None => true,
            Some(last) => now.signed_duration_since(last) >= every,
        },
        Trigger::Daily(at) => {
            let local = now.with_timezone(&offset);
            if local.hour() != u32::from(at.hour()) || local.minute() != u32::from(at.minute()) {
                return false;
            }
            // A last run dated later than today (clock moved back) also
            // suppresses the run.
            match task.last_run_at() {
                None => true,
                Some(last) => last.with_timezone(&offset).date_naive() < local.date_naive(),
            }
        }
        Trigger::Once(run_at) => {
            now >= run_at && task.status() == TaskStatus::Pending && task.last_run_at().is_none()
        }
    }
}

/// Run the work function once and record the outcome. Returns the final
/// status; never panics or propagates a failure.
fn execute(task: &mut Task, args: &TaskArgs, now: DateTime<Utc>) -> TaskStatus {
    task.mark_running();
    tracing::info!("🔔 Task triggered: '{}'", task.id());

    let func = task.func();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| func.call(args)))
        .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));

    match outcome {
        Ok(value) => {
            tracing::info!("✅ Task '{}' succeeded", task.id());
            task.mark_success(now, value);
        }
        Err(e) => {
            tracing::warn!("⚠️ Task '{}' failed: {}", task.id(), e);
            task.mark_failure(now, e);
        }
    }
    task.status()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    };
    format!("Panic: {msg}")
}
