//! Demo task set registered by the `tickwork` binary.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::{Value, json};
use tickwork_core::{Result, TickworkError};
use tickwork_scheduler::{Every, SchedulerEngine, Task, TaskArgs, TaskOutcome, TimeOfDay};

pub const GREETER: &str = "cli_every_7s";
pub const MULTIPLIER: &str = "cli_run_at_12s";
pub const DAILY_GREETING: &str = "cli_at_daily";
pub const FAILING: &str = "cli_failing_18s";
pub const CONSUMER: &str = "cli_use_result_task_22s";

fn greet(args: &TaskArgs) -> TaskOutcome {
    let message = args.arg(0).and_then(Value::as_str).unwrap_or("hello");
    tracing::info!("💬 {message}");
    Ok(json!(format!("Message '{message}' processed at {}", Utc::now().to_rfc3339())))
}

fn multiply(args: &TaskArgs) -> TaskOutcome {
    let a = args.arg(0).and_then(Value::as_i64).ok_or("TypeError: missing operand a")?;
    let b = args.arg(1).and_then(Value::as_i64).ok_or("TypeError: missing operand b")?;
    let product = a.checked_mul(b).ok_or("OverflowError: product out of range")?;
    tracing::info!("✖️ {a} * {b} = {product}");
    Ok(json!(product))
}

fn fail(_: &TaskArgs) -> TaskOutcome {
    Err("RuntimeError: intentional demo failure".to_string())
}

fn use_result(args: &TaskArgs) -> TaskOutcome {
    let upstream = args
        .dependency_result(MULTIPLIER)
        .ok_or("KeyError: missing multiplier result")?;
    Ok(json!(format!("Processed dependency result: {upstream}")))
}

/// Register the demo tasks relative to `now`. Daily times are expressed in
/// the engine's configured offset.
pub fn register_demo_tasks(engine: &mut SchedulerEngine, now: DateTime<Utc>) -> Result<()> {
    engine.register(
        Task::interval(Every::seconds(7), greet)
            .with_id(GREETER)
            .with_args(["Hello from CLI every 7s"]),
    )?;

    engine.register(
        Task::once(now + Duration::seconds(12), multiply)
            .with_id(MULTIPLIER)
            .with_args([7, 6]),
    )?;

    let fire = (now + Duration::seconds(25)).with_timezone(&engine.utc_offset());
    let field = |v: u32| {
        u8::try_from(v).map_err(|_| TickworkError::validation(format!("clock field out of range: {v}")))
    };
    let at = TimeOfDay::new(field(fire.hour())?, field(fire.minute())?)?;
    engine.register(
        Task::daily(at, greet)
            .with_id(DAILY_GREETING)
            .with_args([format!("Daily greeting at {at}")])
            .depends_on(GREETER),
    )?;

    engine.register(Task::once(now + Duration::seconds(18), fail).with_id(FAILING))?;

    engine.register(
        Task::once(now + Duration::seconds(22), use_result)
            .with_id(CONSUMER)
            .depends_on(MULTIPLIER),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use tickwork_scheduler::{TaskStatus, Trigger};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_demo_registers_five_tasks() {
        let mut engine = SchedulerEngine::new();
        register_demo_tasks(&mut engine, start()).unwrap();
        let ids: Vec<&str> = engine.tasks().map(Task::id).collect();
        assert_eq!(ids, [GREETER, MULTIPLIER, DAILY_GREETING, FAILING, CONSUMER]);
    }

    #[test]
    fn test_demo_run_shares_results_between_tasks() {
        let mut engine = SchedulerEngine::new();
        register_demo_tasks(&mut engine, start()).unwrap();

        for s in 0..=30 {
            engine.tick(start() + Duration::seconds(s));
        }

        let multiplier = engine.get(MULTIPLIER).unwrap();
        assert_eq!(multiplier.result(), Some(&json!(42)));

        let consumer = engine.get(CONSUMER).unwrap();
        assert_eq!(consumer.status(), TaskStatus::Success);
        assert_eq!(consumer.result(), Some(&json!("Processed dependency result: 42")));

        let failing = engine.get(FAILING).unwrap();
        assert_eq!(failing.status(), TaskStatus::Failed);
        assert_eq!(failing.error(), Some("RuntimeError: intentional demo failure"));

        // 0, 7, 14, 21, 28
        assert_eq!(engine.get(GREETER).unwrap().history().len(), 5);
        assert_eq!(engine.get(DAILY_GREETING).unwrap().history().len(), 1);
    }

    #[test]
    fn test_daily_greeting_time_follows_engine_offset() {
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        let mut engine = SchedulerEngine::new().with_utc_offset(kst);
        // 10:59:50 UTC + 25s is 20:00:15 in +09:00.
        let now = Utc.with_ymd_and_hms(2026, 2, 22, 10, 59, 50).unwrap();
        register_demo_tasks(&mut engine, now).unwrap();

        assert_eq!(
            engine.trigger(DAILY_GREETING).unwrap(),
            Trigger::Daily(TimeOfDay::new(20, 0).unwrap())
        );
    }

    #[test]
    fn test_multiply_rejects_missing_operand() {
        let args = TaskArgs {
            args: vec![json!(7)],
            ..TaskArgs::default()
        };
        assert!(multiply(&args).is_err());
    }
}
