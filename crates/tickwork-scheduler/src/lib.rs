//! # Tickwork Scheduler
//!
//! In-process task scheduler with a periodic-check model.
//!
//! ## Architecture
//! ```text
//! Driver (tokio interval, non-reentrant)
//!   └── every tick → SchedulerEngine::tick(now)
//!         ├── IntervalTask: every 5s          → "add(2, 3)"
//!         ├── DailyTask:    at 14:30          → "mul(10, 5)", depends on the interval task
//!         └── OnceTask:     run_at 10:00:30   → "one-off"
//!
//! For each task, in registration order:
//!   should-run (trigger) → dependencies ready → execute → write status/result/history
//! ```
//!
//! A task's work function receives its own arguments plus one `dep_<id>`
//! keyword per dependency carrying that dependency's latest result.

pub mod driver;
pub mod engine;
pub mod tasks;

pub use driver::{SchedulerHandle, SharedEngine, run_scheduler, run_tick, shared, spawn_scheduler};
pub use engine::{SchedulerEngine, TickReport};
pub use tasks::{
    DEPENDENCY_KWARG_PREFIX, Every, ExecutionRecord, Schedule, Task, TaskArgs, TaskFn,
    TaskOutcome, TaskSnapshot, TaskStatus, TimeOfDay, Trigger, dependency_key,
};
