//! Reminder timers for scheduled tasks.
//!
//! Each task gets at most two one-shot timers: one at its start and one at
//! its end. The end timer re-reads the task when it fires, so a task completed
//! after arming produces "ended" rather than "overdue", and a task deleted in
//! the meantime produces nothing. Timer handles live in a registry owned by
//! the scheduler; dropping the scheduler aborts them all.
//!
//! Timers are tokio tasks, so arming must happen inside a tokio runtime.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::providers::{Clock, Notifier, TaskLookup};
use crate::task::ScheduledTask;
use crate::time::{local_date, local_to_utc};

pub const DAILY_SUMMARY_TAG: &str = "daily-summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPolicy {
    /// Local wall-clock time of the once-per-session summary.
    pub daily_summary_at: NaiveTime,
    pub notify_start: bool,
    pub notify_end: bool,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            daily_summary_at: NaiveTime::from_hms_opt(21, 0, 0).expect("21:00 is a valid time"),
            notify_start: true,
            notify_end: true,
        }
    }
}

/// Which of a task's timers fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Start,
    End,
}

impl ReminderKind {
    pub fn tag(&self, task_id: &str) -> String {
        match self {
            ReminderKind::Start => format!("start-{task_id}"),
            ReminderKind::End => format!("end-{task_id}"),
        }
    }
}

/// Delays from `now` until the task's start and end, skipping any that are
/// not strictly in the future.
pub fn reminder_delays(
    task: &ScheduledTask,
    now: DateTime<Utc>,
    policy: &ReminderPolicy,
) -> Vec<(ReminderKind, Duration)> {
    let mut out = Vec::with_capacity(2);
    if policy.notify_start {
        out.push((ReminderKind::Start, task.start - now));
    }
    if policy.notify_end {
        out.push((ReminderKind::End, task.end - now));
    }
    out.retain(|(_, d)| *d > Duration::zero());
    out
}

fn fire_start(notifier: &dyn Notifier, task: &ScheduledTask) {
    notifier.show(
        "Task started",
        &format!("{} has started.", task.title),
        &ReminderKind::Start.tag(&task.id),
    );
}

fn fire_end(notifier: &dyn Notifier, lookup: &dyn TaskLookup, task_id: &str) {
    let Some(task) = lookup.lookup(task_id) else {
        debug!(task_id, "end timer fired for a removed task; ignoring");
        return;
    };
    let tag = ReminderKind::End.tag(task_id);
    if task.is_completed() {
        notifier.show("Task ended", &format!("{} has ended.", task.title), &tag);
    } else {
        notifier.show(
            "Task overdue",
            &format!("{} is overdue and not yet completed.", task.title),
            &tag,
        );
    }
}

/// Counts only tasks starting on `day` in `tz`.
fn summary_body(tasks: &[ScheduledTask], day: NaiveDate, tz: Tz) -> String {
    let todays: Vec<&ScheduledTask> = tasks
        .iter()
        .filter(|t| local_date(t.start, tz) == day)
        .collect();
    let done = todays.iter().filter(|t| t.is_completed()).count();
    format!("You completed {} of {} tasks today.", done, todays.len())
}

pub struct ReminderScheduler {
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    lookup: Arc<dyn TaskLookup>,
    policy: ReminderPolicy,
    timers: HashMap<String, Vec<JoinHandle<()>>>,
    summary: Option<JoinHandle<()>>,
}

impl ReminderScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        lookup: Arc<dyn TaskLookup>,
    ) -> Self {
        Self {
            clock,
            notifier,
            lookup,
            policy: ReminderPolicy::default(),
            timers: HashMap::new(),
            summary: None,
        }
    }

    pub fn with_policy(mut self, policy: ReminderPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// (Re)arm the start/end timers for `task`. Prior timers for the same id
    /// are cancelled first. Returns how many timers are now armed.
    pub fn arm(&mut self, task: &ScheduledTask) -> usize {
        self.disarm(&task.id);
        self.prune_finished();

        let now = self.clock.now();
        let mut handles = Vec::new();
        for (kind, delay) in reminder_delays(task, now, &self.policy) {
            let Ok(sleep_for) = delay.to_std() else {
                continue;
            };
            let notifier = Arc::clone(&self.notifier);
            let handle = match kind {
                ReminderKind::Start => {
                    let snapshot = task.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(sleep_for).await;
                        fire_start(notifier.as_ref(), &snapshot);
                    })
                }
                ReminderKind::End => {
                    let lookup = Arc::clone(&self.lookup);
                    let task_id = task.id.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(sleep_for).await;
                        fire_end(notifier.as_ref(), lookup.as_ref(), &task_id);
                    })
                }
            };
            handles.push(handle);
        }

        let armed = handles.len();
        debug!(task_id = %task.id, armed, "armed reminders");
        if armed > 0 {
            self.timers.insert(task.id.clone(), handles);
        }
        armed
    }

    pub fn arm_all<'a>(&mut self, tasks: impl IntoIterator<Item = &'a ScheduledTask>) -> usize {
        tasks.into_iter().map(|t| self.arm(t)).sum()
    }

    /// Drop registry entries whose timers have all fired.
    fn prune_finished(&mut self) {
        self.timers.retain(|_, handles| {
            handles.retain(|h| !h.is_finished());
            !handles.is_empty()
        });
    }

    /// Cancel every timer for `task_id`. No-op when nothing is armed.
    ///
    /// A timer whose callback has already started still runs to completion.
    pub fn disarm(&mut self, task_id: &str) {
        if let Some(handles) = self.timers.remove(task_id) {
            for h in &handles {
                h.abort();
            }
            debug!(task_id, cancelled = handles.len(), "disarmed reminders");
        }
    }

    /// Timers for `task_id` that have not yet fired or been cancelled.
    pub fn live_timers(&self, task_id: &str) -> usize {
        self.timers
            .get(task_id)
            .map(|hs| hs.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    pub fn armed_task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, hs)| hs.iter().any(|h| !h.is_finished()))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Arm the daily summary for today's `policy.daily_summary_at` in `tz`.
    /// Returns `false` when that time has already passed today; there is no
    /// catch-up firing.
    pub fn arm_daily_summary(&mut self, tz: Tz) -> Result<bool, ValidationError> {
        let now = self.clock.now();
        let today = local_date(now, tz);
        let target = local_to_utc(today, self.policy.daily_summary_at, tz)?;
        let Ok(sleep_for) = (target - now).to_std() else {
            debug!(%target, "daily summary time already passed; not armed");
            return Ok(false);
        };
        if sleep_for.is_zero() {
            return Ok(false);
        }

        if let Some(prev) = self.summary.take() {
            prev.abort();
        }
        let notifier = Arc::clone(&self.notifier);
        let lookup = Arc::clone(&self.lookup);
        self.summary = Some(tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;
            let body = summary_body(&lookup.snapshot(), today, tz);
            notifier.show("Daily summary", &body, DAILY_SUMMARY_TAG);
        }));
        info!(%target, "daily summary armed");
        Ok(true)
    }

    pub fn summary_armed(&self) -> bool {
        self.summary.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Abort every outstanding timer.
    pub fn shutdown(&mut self) {
        for (_, handles) in self.timers.drain() {
            for h in handles {
                h.abort();
            }
        }
        if let Some(h) = self.summary.take() {
            h.abort();
        }
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
