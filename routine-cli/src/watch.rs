use anyhow::{Context, Result};
use chrono_tz::Tz;
use routine_core::{Notifier, ReminderPolicy, RoutineKernel, StoreLookup};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::Config;
use crate::notify::TerminalNotifier;
use crate::state::JsonFileStore;

/// How often `watch` re-reads the routine home for changes made by other
/// `routine` invocations.
pub const RELOAD_EVERY: Duration = Duration::from_secs(30);

/// Arm reminders whose end timers read status from disk when they fire.
pub fn start_reminders(
    kernel: &mut RoutineKernel<JsonFileStore>,
    notifier: Arc<dyn Notifier>,
    policy: ReminderPolicy,
) -> usize {
    let lookup = StoreLookup::new(kernel.store().clone(), kernel.book().clone());
    kernel.enable_reminders_with(notifier, policy, Arc::new(lookup))
}

pub async fn run_watch(kernel: &mut RoutineKernel<JsonFileStore>, cfg: &Config, tz: Tz) -> Result<()> {
    let notifier = Arc::new(TerminalNotifier::new(cfg.reminders.desktop_notifications));
    let armed = start_reminders(kernel, notifier, cfg.reminder_policy()?);
    let summary = kernel.arm_daily_summary(tz)?;
    println!(
        "Watching {} tasks ({} reminders{}). Ctrl-C to stop.",
        kernel.tasks().len(),
        armed,
        if summary { ", daily summary on" } else { "" }
    );

    let mut tick = tokio::time::interval(RELOAD_EVERY);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("waiting for Ctrl-C")?;
                break;
            }
            _ = tick.tick() => {
                if let Err(err) = kernel.reload() {
                    warn!(error = %err, "reload failed; keeping current reminders");
                }
            }
        }
    }
    info!("stopping reminders");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use routine_core::{FixedClock, RecordingNotifier, ScheduledTask, TaskStore, TimeInterval};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn task(id: &str, start_min: i64, end_min: i64) -> ScheduledTask {
        let iv = TimeInterval::new(
            t0() + ChronoDuration::minutes(start_min),
            t0() + ChronoDuration::minutes(end_min),
        )
        .unwrap();
        ScheduledTask::new(id, format!("Task {id}"), iv, t0())
    }

    fn open(dir: &std::path::Path, at: DateTime<Utc>) -> RoutineKernel<JsonFileStore> {
        RoutineKernel::open(JsonFileStore::new(dir), Arc::new(FixedClock::new(at))).unwrap()
    }

    async fn sleep_min(m: u64) {
        tokio::time::sleep(Duration::from_secs(m * 60)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn completion_from_another_invocation_reads_as_ended() {
        let dir = tempfile::tempdir().unwrap();
        JsonFileStore::new(dir.path())
            .save_tasks(&[task("focus", 5, 65)])
            .unwrap();

        let mut watcher = open(dir.path(), t0());
        let notifier = Arc::new(RecordingNotifier::new());
        assert_eq!(
            start_reminders(&mut watcher, notifier.clone(), ReminderPolicy::default()),
            2
        );

        sleep_min(20).await;
        let mut other = open(dir.path(), t0() + ChronoDuration::minutes(20));
        other.toggle("focus").unwrap();

        sleep_min(50).await;
        assert_eq!(notifier.titles(), vec!["Task started", "Task ended"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_arms_and_disarms_tasks_changed_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        JsonFileStore::new(dir.path())
            .save_tasks(&[task("focus", 5, 65)])
            .unwrap();

        let mut watcher = open(dir.path(), t0());
        let notifier = Arc::new(RecordingNotifier::new());
        start_reminders(&mut watcher, notifier.clone(), ReminderPolicy::default());

        let mut other = open(dir.path(), t0());
        other.delete("focus").unwrap();
        other.add(task("late", 30, 60)).unwrap();

        assert_eq!(watcher.reload().unwrap(), 2);
        let reminders = watcher.reminders().unwrap();
        assert_eq!(reminders.live_timers("focus"), 0);
        assert_eq!(reminders.live_timers("late"), 2);

        sleep_min(70).await;
        let tags: Vec<String> = notifier.shown().into_iter().map(|s| s.tag).collect();
        assert_eq!(tags, vec!["start-late", "end-late"]);
    }
}
