//! Setup planner: turns what the user enters during setup into a schedule
//! preview for one local day.
//!
//! - Duration mode: commitments + task lengths go through the free-slot allocator.
//! - Clock mode: the user gives explicit local start/end times.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::allocator::{allocate, Commitment, DurationRequest};
use crate::error::ValidationError;
use crate::interval::TimeInterval;
use crate::overlap::SchedulePreview;
use crate::providers::IdGenerator;
use crate::task::{Priority, ScheduledTask};
use crate::time::{day_start, local_date, local_to_utc};

/// One clock-mode entry. An `end` at or before `start` runs past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEntry {
    pub title: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category_id: Option<String>,
}

impl ClockEntry {
    pub fn new(title: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            priority: Priority::Medium,
            category_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySetup {
    pub date: NaiveDate,
    pub tz: Tz,
}

impl DaySetup {
    pub fn new(date: NaiveDate, tz: Tz) -> Self {
        Self { date, tz }
    }

    pub fn for_today(now: DateTime<Utc>, tz: Tz) -> Self {
        Self::new(local_date(now, tz), tz)
    }

    pub fn day_start(&self) -> Result<DateTime<Utc>, ValidationError> {
        day_start(self.date, self.tz)
    }

    /// Allocate commitments then duration tasks across the day.
    ///
    /// Empty titles and non-positive task lengths are rejected up front;
    /// a commitment of zero minutes is simply skipped.
    pub fn duration_mode(
        &self,
        commitments: &[Commitment],
        requests: &[DurationRequest],
        ids: &dyn IdGenerator,
        now: DateTime<Utc>,
    ) -> Result<SchedulePreview, ValidationError> {
        for r in requests {
            if r.title.trim().is_empty() {
                return Err(ValidationError::EmptyTitle);
            }
            if r.minutes <= 0 {
                return Err(ValidationError::NonPositiveDuration {
                    title: r.title.clone(),
                    minutes: r.minutes,
                });
            }
        }

        let allocation = allocate(self.day_start()?, commitments, requests, ids, now);
        info!(
            date = %self.date,
            placed = allocation.placed.len(),
            dropped = allocation.dropped.len(),
            free_minutes = allocation.free_minutes(),
            "duration-mode schedule allocated"
        );
        Ok(SchedulePreview::from(allocation))
    }

    /// Turn explicit local clock times into tasks, sorted by start.
    pub fn clock_mode(
        &self,
        entries: &[ClockEntry],
        ids: &dyn IdGenerator,
        now: DateTime<Utc>,
    ) -> Result<SchedulePreview, ValidationError> {
        let mut tasks = Vec::with_capacity(entries.len());
        for e in entries {
            if e.title.trim().is_empty() {
                return Err(ValidationError::EmptyTitle);
            }
            let interval = self.clock_interval(e.start, e.end)?;
            let task = ScheduledTask::new(ids.next_id(), e.title.clone(), interval, now)
                .with_priority(e.priority)
                .with_category(e.category_id.clone());
            tasks.push(task);
        }
        tasks.sort_by_key(|t| t.start);
        for (i, t) in tasks.iter_mut().enumerate() {
            t.order = i;
        }
        Ok(SchedulePreview::new(tasks))
    }

    /// Resolve local start/end on this day; an end not after start rolls over
    /// to the next day.
    pub fn clock_interval(
        &self,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<TimeInterval, ValidationError> {
        let start_utc = local_to_utc(self.date, start, self.tz)?;
        let end_date = if end <= start {
            self.date + Duration::days(1)
        } else {
            self.date
        };
        let end_utc = local_to_utc(end_date, end, self.tz)?;
        TimeInterval::new(start_utc, end_utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SequentialIds;
    use crate::time::parse_tz;
    use chrono::TimeZone;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn setup() -> DaySetup {
        DaySetup::new(
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            parse_tz("America/Chicago").unwrap(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap()
    }

    #[test]
    fn duration_mode_starts_at_local_midnight() {
        let preview = setup()
            .duration_mode(
                &[Commitment::sleep(480)],
                &[DurationRequest::new("Study", 90)],
                &SequentialIds::new("t"),
                now(),
            )
            .unwrap();
        let tasks = preview.tasks();
        // Chicago is UTC-6 in early March.
        assert_eq!(tasks[0].start, Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap());
        assert_eq!(tasks[1].title, "Study");
        assert_eq!(tasks[1].start, Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap());
    }

    #[test]
    fn duration_mode_rejects_bad_requests() {
        let ids = SequentialIds::new("t");
        let err = setup()
            .duration_mode(&[], &[DurationRequest::new("Nap", 0)], &ids, now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonPositiveDuration { minutes: 0, .. }));

        let err = setup()
            .duration_mode(&[], &[DurationRequest::new(" ", 10)], &ids, now())
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyTitle);
    }

    #[test]
    fn duration_mode_reports_dropped_work() {
        let preview = setup()
            .duration_mode(
                &[Commitment::sleep(0), Commitment::work(24 * 60)],
                &[DurationRequest::new("Read", 30)],
                &SequentialIds::new("t"),
                now(),
            )
            .unwrap();
        assert_eq!(preview.tasks().len(), 1);
        assert_eq!(preview.dropped().len(), 1);
        assert_eq!(preview.dropped()[0].title(), "Read");
    }

    #[test]
    fn clock_mode_sorts_and_rolls_over_midnight() {
        let preview = setup()
            .clock_mode(
                &[
                    ClockEntry::new("Sleep", hm(23, 0), hm(7, 0)),
                    ClockEntry::new("Breakfast", hm(7, 30), hm(8, 0)),
                ],
                &SequentialIds::new("c"),
                now(),
            )
            .unwrap();
        let tasks = preview.tasks();
        assert_eq!(tasks[0].title, "Breakfast");
        assert_eq!(tasks[1].title, "Sleep");
        assert_eq!((tasks[1].end - tasks[1].start).num_hours(), 8);
        assert_eq!(tasks[1].order, 1);
    }
}
