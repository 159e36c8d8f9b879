//! Task definitions — the core data model for scheduled work.
//!
//! A [`Task`] carries its schedule options, its work function and the state
//! the engine writes back after every run. Nothing here decides *when* a task
//! runs; that lives in [`crate::engine`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tickwork_core::{Result, TickworkError};

/// Prefix of the keyword under which a dependency's result is passed on.
pub const DEPENDENCY_KWARG_PREFIX: &str = "dep_";

/// Keyword name carrying the result of dependency `id`.
pub fn dependency_key(id: &str) -> String {
    format!("{DEPENDENCY_KWARG_PREFIX}{id}")
}

/// What a work function returns: a value on success, a detail on failure.
pub type TaskOutcome = std::result::Result<Value, String>;

/// A unit of work the scheduler can invoke.
///
/// Implemented for every `Fn(&TaskArgs) -> TaskOutcome`, so plain closures
/// work out of the box.
pub trait TaskFn: Send + Sync {
    fn call(&self, args: &TaskArgs) -> TaskOutcome;
}

impl<F> TaskFn for F
where
    F: Fn(&TaskArgs) -> TaskOutcome + Send + Sync,
{
    fn call(&self, args: &TaskArgs) -> TaskOutcome {
        self(args)
    }
}

/// Argument bag handed to a work function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    /// Positional arguments, in order.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
}

impl TaskArgs {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    /// Latest result of dependency `id`, if it was passed in.
    pub fn dependency_result(&self, id: &str) -> Option<&Value> {
        self.kwargs.get(&dependency_key(id))
    }
}

/// Recurring interval expressed as unit counts, e.g. `{"minutes": 5}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Every {
    pub weeks: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub milliseconds: u64,
}

impl Every {
    pub fn seconds(n: u64) -> Self {
        Self { seconds: n, ..Self::default() }
    }

    pub fn minutes(n: u64) -> Self {
        Self { minutes: n, ..Self::default() }
    }

    pub fn hours(n: u64) -> Self {
        Self { hours: n, ..Self::default() }
    }

    pub fn days(n: u64) -> Self {
        Self { days: n, ..Self::default() }
    }

    /// Build from `(unit, count)` pairs. Unknown units and negative counts
    /// are validation errors.
    pub fn from_units<I, K>(units: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut every = Self::default();
        for (unit, count) in units {
            let unit = unit.as_ref();
            let count = u64::try_from(count).map_err(|_| {
                TickworkError::validation(format!("interval unit '{unit}' must not be negative"))
            })?;
            let slot = match unit {
                "weeks" => &mut every.weeks,
                "days" => &mut every.days,
                "hours" => &mut every.hours,
                "minutes" => &mut every.minutes,
                "seconds" => &mut every.seconds,
                "milliseconds" => &mut every.milliseconds,
                other => {
                    return Err(TickworkError::validation(format!(
                        "unknown interval unit '{other}'"
                    )));
                }
            };
            *slot = slot.saturating_add(count);
        }
        Ok(every)
    }

    /// Total length as a duration. Zero and overflowing intervals are
    /// validation errors.
    pub fn to_duration(&self) -> Result<Duration> {
        let parts = [
            (self.weeks, 7 * 24 * 3_600_000),
            (self.days, 24 * 3_600_000),
            (self.hours, 3_600_000),
            (self.minutes, 60_000),
            (self.seconds, 1_000),
            (self.milliseconds, 1),
        ];
        let total_ms = parts
            .iter()
            .try_fold(0u64, |acc, (count, unit_ms)| {
                count.checked_mul(*unit_ms).and_then(|ms| acc.checked_add(ms))
            })
            .and_then(|ms| i64::try_from(ms).ok())
            .ok_or_else(|| TickworkError::validation(format!("interval too large: {self}")))?;

        if total_ms == 0 {
            return Err(TickworkError::validation("interval must be positive"));
        }
        Duration::try_milliseconds(total_ms)
            .ok_or_else(|| TickworkError::validation(format!("interval too large: {self}")))
    }
}

impl fmt::Display for Every {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            (self.weeks, "w"),
            (self.days, "d"),
            (self.hours, "h"),
            (self.minutes, "m"),
            (self.seconds, "s"),
            (self.milliseconds, "ms"),
        ]
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, unit)| format!("{count}{unit}"))
        .collect();

        if parts.is_empty() {
            write!(f, "0s")
        } else {
            write!(f, "{}", parts.join(""))
        }
    }
}

/// Wall-clock time of day, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(TickworkError::validation(format!(
                "time of day out of range: {hour}:{minute}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl FromStr for TimeOfDay {
    type Err = TickworkError;

    /// Parse `"HH:MM"` (one or two digits per field).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TickworkError::validation(format!("expected HH:MM, got '{s}'"));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let field = |part: &str| -> Result<u8> {
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };
        Self::new(field(h)?, field(m)?)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TickworkError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Raw schedule options as the caller set them. Exactly one must be present
/// for the task to be accepted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub every: Option<Every>,
    pub at: Option<TimeOfDay>,
    pub run_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Validate the options and resolve them into a [`Trigger`].
    pub fn trigger(&self) -> Result<Trigger> {
        match (&self.every, &self.at, &self.run_at) {
            (Some(every), None, None) => Ok(Trigger::Every(every.to_duration()?)),
            (None, Some(at), None) => Ok(Trigger::Daily(*at)),
            (None, None, Some(run_at)) => Ok(Trigger::Once(*run_at)),
            _ => Err(TickworkError::validation(
                "task must specify exactly one of every / at / run_at",
            )),
        }
    }
}

/// Resolved trigger of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Re-fire once the interval has elapsed since the last run.
    Every(Duration),
    /// Fire once per calendar day at the given time.
    Daily(TimeOfDay),
    /// Fire exactly once, at or after the instant.
    Once(DateTime<Utc>),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every(d) => write!(f, "every {}s", d.num_milliseconds() as f64 / 1000.0),
            Self::Daily(at) => write!(f, "daily at {at}"),
            Self::Once(at) => write!(f, "once at {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        }
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Tick timestamp the attempt ran under.
    pub run_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// A scheduled task.
#[derive(Clone)]
pub struct Task {
    id: String,
    schedule: Schedule,
    func: Arc<dyn TaskFn>,
    args: TaskArgs,
    depends_on: Vec<String>,

    pub(crate) status: TaskStatus,
    pub(crate) last_run_at: Option<DateTime<Utc>>,
    pub(crate) last_success_at: Option<DateTime<Utc>>,
    pub(crate) result: Option<Value>,
    pub(crate) error: Option<String>,
    pub(crate) history: Vec<ExecutionRecord>,
}

impl Task {
    /// Create a task with a fresh id and no schedule option set yet.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&TaskArgs) -> TaskOutcome + Send + Sync + 'static,
    {
        Self::with_handler(Arc::new(func))
    }

    /// Create a task around an existing [`TaskFn`] implementation.
    pub fn with_handler(func: Arc<dyn TaskFn>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            schedule: Schedule::default(),
            func,
            args: TaskArgs::default(),
            depends_on: Vec::new(),
            status: TaskStatus::Pending,
            last_run_at: None,
            last_success_at: None,
            result: None,
            error: None,
            history: Vec::new(),
        }
    }

    /// Create a recurring interval task.
    pub fn interval<F>(every: Every, func: F) -> Self
    where
        F: Fn(&TaskArgs) -> TaskOutcome + Send + Sync + 'static,
    {
        Self::new(func).every(every)
    }

    /// Create a task firing daily at `at`.
    pub fn daily<F>(at: TimeOfDay, func: F) -> Self
    where
        F: Fn(&TaskArgs) -> TaskOutcome + Send + Sync + 'static,
    {
        Self::new(func).at(at)
    }

    /// Create a one-time task.
    pub fn once<F>(at: DateTime<Utc>, func: F) -> Self
    where
        F: Fn(&TaskArgs) -> TaskOutcome + Send + Sync + 'static,
    {
        Self::new(func).run_at(at)
    }

    /// Use a caller-chosen id instead of the generated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn every(mut self, every: Every) -> Self {
        self.schedule.every = Some(every);
        self
    }

    pub fn at(mut self, at: TimeOfDay) -> Self {
        self.schedule.at = Some(at);
        self
    }

    pub fn run_at(mut self, at: DateTime<Utc>) -> Self {
        self.schedule.run_at = Some(at);
        self
    }

    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.args.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.kwargs.insert(key.into(), value.into());
        self
    }

    /// Gate this task on `id` having succeeded at least once.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn args(&self) -> &TaskArgs {
        &self.args
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run_at
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn history(&self) -> &[ExecutionRecord] {
        &self.history
    }

    pub(crate) fn func(&self) -> Arc<dyn TaskFn> {
        Arc::clone(&self.func)
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
    }

    pub(crate) fn mark_success(&mut self, now: DateTime<Utc>, value: Value) {
        debug_assert_eq!(self.status, TaskStatus::Running, "outcome recorded without a run");
        self.status = TaskStatus::Success;
        self.last_run_at = Some(now);
        self.last_success_at = Some(now);
        self.error = None;
        self.result = Some(value.clone());
        self.history.push(ExecutionRecord {
            run_at: now,
            status: TaskStatus::Success,
            result: Some(value),
            error: None,
        });
    }

    /// Record a failed attempt. The previous `result` is kept.
    pub(crate) fn mark_failure(&mut self, now: DateTime<Utc>, error: String) {
        debug_assert_eq!(self.status, TaskStatus::Running, "outcome recorded without a run");
        self.status = TaskStatus::Failed;
        self.last_run_at = Some(now);
        self.error = Some(error.clone());
        self.history.push(ExecutionRecord {
            run_at: now,
            status: TaskStatus::Failed,
            result: None,
            error: Some(error),
        });
    }

    /// Serializable view of the task's state.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            schedule: self.schedule.clone(),
            depends_on: self.depends_on.clone(),
            status: self.status,
            last_run_at: self.last_run_at,
            last_success_at: self.last_success_at,
            result: self.result.clone(),
            error: self.error.clone(),
            history: self.history.clone(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("schedule", &self.schedule)
            .field("args", &self.args)
            .field("depends_on", &self.depends_on)
            .field("status", &self.status)
            .field("last_run_at", &self.last_run_at)
            .field("last_success_at", &self.last_success_at)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of a task's state, for polling and logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub schedule: Schedule,
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub history: Vec<ExecutionRecord>,
}
