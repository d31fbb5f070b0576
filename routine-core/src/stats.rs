//! Historical completion statistics.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::task::{CompletedTask, Priority, ScheduledTask};
use crate::time::local_date;

pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineStats {
    pub total_completed: usize,
    pub today_total: usize,
    pub today_completed: usize,
    /// 0.0..=1.0; 0.0 when nothing is scheduled today.
    pub completion_rate: f64,
    pub streak_days: usize,
    /// Oldest first, one entry per day in the window, zeros included.
    pub per_day: Vec<(NaiveDate, usize)>,
    pub per_category: BTreeMap<String, usize>,
    pub per_priority: BTreeMap<Priority, usize>,
}

/// `tasks` is the live list, `history` the append-only completion log.
/// Only tasks starting on the local `today` count toward the daily rate.
/// `window_days` bounds `per_day`.
pub fn compute(
    tasks: &[ScheduledTask],
    history: &[CompletedTask],
    now: DateTime<Utc>,
    tz: Tz,
    window_days: usize,
) -> RoutineStats {
    let today = local_date(now, tz);

    let todays: Vec<&ScheduledTask> = tasks
        .iter()
        .filter(|t| local_date(t.start, tz) == today)
        .collect();
    let today_total = todays.len();
    let today_completed = todays.iter().filter(|t| t.is_completed()).count();
    let completion_rate = if today_total == 0 {
        0.0
    } else {
        today_completed as f64 / today_total as f64
    };

    let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut per_category = BTreeMap::new();
    let mut per_priority = BTreeMap::new();
    for rec in history {
        *by_day.entry(local_date(rec.completed_at, tz)).or_insert(0) += 1;
        let cat = rec
            .task
            .category_id
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        *per_category.entry(cat).or_insert(0) += 1;
        *per_priority.entry(rec.task.priority).or_insert(0) += 1;
    }

    let per_day = (0..window_days)
        .rev()
        .map(|back| {
            let day = today - Duration::days(back as i64);
            (day, by_day.get(&day).copied().unwrap_or(0))
        })
        .collect();

    let active: HashSet<NaiveDate> = by_day.keys().copied().collect();

    RoutineStats {
        total_completed: history.len(),
        today_total,
        today_completed,
        completion_rate,
        streak_days: streak(&active, today),
        per_day,
        per_category,
        per_priority,
    }
}

/// Consecutive active days ending today, or yesterday if today has nothing yet.
fn streak(active: &HashSet<NaiveDate>, today: NaiveDate) -> usize {
    let mut day = if active.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut n = 0;
    while active.contains(&day) {
        n += 1;
        day -= Duration::days(1);
    }
    n
}
