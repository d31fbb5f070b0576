//! Free-slot allocator for duration-mode setup.
//!
//! The day starts as one free window `[day_start, day_start + 24h)`. Fixed
//! commitments are placed first in caller order, then duration tasks
//! longest-first. Each item goes at the start of the first window long enough
//! to hold it (first-fit). Items that fit nowhere are reported as dropped.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::interval::TimeInterval;
use crate::providers::IdGenerator;
use crate::task::{Priority, ScheduledTask};

pub const DAY_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentKind {
    Sleep,
    Work,
    Custom(String),
}

impl CommitmentKind {
    pub fn title(&self) -> &str {
        match self {
            CommitmentKind::Sleep => "Sleep",
            CommitmentKind::Work => "Work",
            CommitmentKind::Custom(label) => label,
        }
    }
}

/// A fixed-duration block such as sleep or work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub kind: CommitmentKind,
    pub minutes: i64,
}

impl Commitment {
    pub fn sleep(minutes: i64) -> Self {
        Self {
            kind: CommitmentKind::Sleep,
            minutes,
        }
    }

    pub fn work(minutes: i64) -> Self {
        Self {
            kind: CommitmentKind::Work,
            minutes,
        }
    }

    pub fn custom(label: impl Into<String>, minutes: i64) -> Self {
        Self {
            kind: CommitmentKind::Custom(label.into()),
            minutes,
        }
    }
}

/// A user task with a length but no clock time yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRequest {
    pub title: String,
    pub minutes: i64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category_id: Option<String>,
}

impl DurationRequest {
    pub fn new(title: impl Into<String>, minutes: i64) -> Self {
        Self {
            title: title.into(),
            minutes,
            priority: Priority::Medium,
            category_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }
}

/// Something the allocator could not place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dropped {
    Commitment(Commitment),
    Task(DurationRequest),
}

impl Dropped {
    pub fn title(&self) -> &str {
        match self {
            Dropped::Commitment(c) => c.kind.title(),
            Dropped::Task(r) => &r.title,
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Dropped::Commitment(c) => c.minutes,
            Dropped::Task(r) => r.minutes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    /// Sorted by start; `order` is the rank in this list.
    pub placed: Vec<ScheduledTask>,
    pub dropped: Vec<Dropped>,
    /// Whatever free time remains, sorted by start.
    pub free: Vec<TimeInterval>,
}

impl Allocation {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }

    pub fn free_minutes(&self) -> i64 {
        self.free.iter().map(|s| s.duration().num_minutes()).sum()
    }
}

/// Ordered free windows within a single scheduling day.
#[derive(Debug, Clone)]
pub struct FreeSlotAllocator {
    slots: Vec<TimeInterval>,
}

impl FreeSlotAllocator {
    pub fn new(day_start: DateTime<Utc>) -> Self {
        let day = TimeInterval {
            start: day_start,
            end: day_start + Duration::minutes(DAY_MINUTES),
        };
        Self { slots: vec![day] }
    }

    pub fn free_slots(&self) -> &[TimeInterval] {
        &self.slots
    }

    /// First-fit: carve `length` from the front of the first slot that holds it.
    pub fn place(&mut self, length: Duration) -> Option<TimeInterval> {
        if length <= Duration::zero() {
            return None;
        }
        let idx = self.slots.iter().position(|s| s.can_fit(length))?;
        let (head, tail) = self.slots[idx].take_front(length)?;
        match tail {
            Some(rest) => self.slots[idx] = rest,
            None => {
                self.slots.remove(idx);
            }
        }
        Some(head)
    }

    fn into_free(self) -> Vec<TimeInterval> {
        self.slots
    }
}

/// Build a concrete schedule for the day starting at `day_start`.
///
/// Never reads the clock: `created_at` is stamped on every placed task.
pub fn allocate(
    day_start: DateTime<Utc>,
    commitments: &[Commitment],
    requests: &[DurationRequest],
    ids: &dyn IdGenerator,
    created_at: DateTime<Utc>,
) -> Allocation {
    let mut slots = FreeSlotAllocator::new(day_start);
    let mut placed = Vec::new();
    let mut dropped = Vec::new();

    for c in commitments {
        if c.minutes <= 0 {
            debug!(kind = c.kind.title(), minutes = c.minutes, "skipping empty commitment");
            continue;
        }
        match slots.place(Duration::minutes(c.minutes)) {
            Some(iv) => {
                debug!(kind = c.kind.title(), start = %iv.start, end = %iv.end, "placed commitment");
                placed.push(ScheduledTask::new(ids.next_id(), c.kind.title(), iv, created_at));
            }
            None => {
                warn!(kind = c.kind.title(), minutes = c.minutes, "commitment does not fit; dropped");
                dropped.push(Dropped::Commitment(c.clone()));
            }
        }
    }

    // Longest first; the sort is stable so equal lengths keep caller order.
    let mut ordered: Vec<&DurationRequest> = requests.iter().collect();
    ordered.sort_by(|a, b| b.minutes.cmp(&a.minutes));

    for r in ordered {
        if r.minutes <= 0 {
            debug!(title = %r.title, minutes = r.minutes, "skipping empty task");
            continue;
        }
        match slots.place(Duration::minutes(r.minutes)) {
            Some(iv) => {
                debug!(title = %r.title, start = %iv.start, end = %iv.end, "placed task");
                let task = ScheduledTask::new(ids.next_id(), r.title.clone(), iv, created_at)
                    .with_priority(r.priority)
                    .with_category(r.category_id.clone());
                placed.push(task);
            }
            None => {
                warn!(title = %r.title, minutes = r.minutes, "task does not fit; dropped");
                dropped.push(Dropped::Task(r.clone()));
            }
        }
    }

    placed.sort_by_key(|t| t.start);
    for (i, t) in placed.iter_mut().enumerate() {
        t.order = i;
    }

    Allocation {
        placed,
        dropped,
        free: slots.into_free(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SequentialIds;
    use chrono::TimeZone;

    fn day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
    }

    fn hm(h: i64, m: i64) -> DateTime<Utc> {
        day() + Duration::hours(h) + Duration::minutes(m)
    }

    fn run(commitments: &[Commitment], requests: &[DurationRequest]) -> Allocation {
        allocate(day(), commitments, requests, &SequentialIds::new("t"), day())
    }

    #[test]
    fn sleep_work_study_pack_front_to_back() {
        let out = run(
            &[Commitment::sleep(480), Commitment::work(480)],
            &[DurationRequest::new("Study", 90)],
        );
        let spans: Vec<_> = out
            .placed
            .iter()
            .map(|t| (t.title.as_str(), t.start, t.end))
            .collect();
        assert_eq!(
            spans,
            vec![
                ("Sleep", hm(0, 0), hm(8, 0)),
                ("Work", hm(8, 0), hm(16, 0)),
                ("Study", hm(16, 0), hm(17, 30)),
            ]
        );
        let study = &out.placed[2];
        assert_eq!((study.end - study.start).num_milliseconds(), 5_400_000);
        assert_eq!(out.free, vec![TimeInterval { start: hm(17, 30), end: hm(24, 0) }]);
        assert!(out.is_complete());
    }

    #[test]
    fn full_day_work_leaves_no_room() {
        let out = run(
            &[Commitment::sleep(0), Commitment::work(DAY_MINUTES)],
            &[DurationRequest::new("Gym", 30)],
        );
        assert_eq!(out.placed.len(), 1);
        assert_eq!(out.placed[0].title, "Work");
        assert!(out.free.is_empty());
        assert_eq!(out.dropped, vec![Dropped::Task(DurationRequest::new("Gym", 30))]);
    }

    #[test]
    fn oversized_commitment_is_dropped_but_rest_allocates() {
        let out = run(
            &[Commitment::sleep(DAY_MINUTES + 1), Commitment::work(60)],
            &[],
        );
        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.dropped[0].title(), "Sleep");
        assert_eq!(out.placed[0].title, "Work");
        assert_eq!(out.placed[0].start, hm(0, 0));
    }

    #[test]
    fn duration_tasks_go_longest_first() {
        let out = run(
            &[],
            &[
                DurationRequest::new("Short", 15),
                DurationRequest::new("Long", 120),
                DurationRequest::new("Mid", 60),
            ],
        );
        let titles: Vec<_> = out.placed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Long", "Mid", "Short"]);
        assert_eq!(out.placed[1].start, hm(2, 0));
        let orders: Vec<_> = out.placed.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn equal_lengths_keep_input_order() {
        let out = run(
            &[],
            &[
                DurationRequest::new("Read", 60),
                DurationRequest::new("Write", 90),
                DurationRequest::new("Walk", 60),
                DurationRequest::new("Call", 60),
            ],
        );
        let titles: Vec<_> = out.placed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Write", "Read", "Walk", "Call"]);
        assert_eq!(out.placed[1].start, hm(1, 30));
        assert_eq!(out.placed[2].start, hm(2, 30));
        assert_eq!(out.placed[3].start, hm(3, 30));
    }

    #[test]
    fn request_priority_and_category_carry_onto_the_task() {
        let out = run(
            &[],
            &[DurationRequest::new("Run", 30)
                .with_priority(Priority::High)
                .with_category("health")],
        );
        assert_eq!(out.placed[0].priority, Priority::High);
        assert_eq!(out.placed[0].category_id.as_deref(), Some("health"));
    }

    #[test]
    fn first_fit_skips_slots_that_are_too_small() {
        let mut slots = FreeSlotAllocator::new(day());
        slots.slots = vec![
            TimeInterval { start: hm(1, 0), end: hm(1, 30) },
            TimeInterval { start: hm(3, 0), end: hm(5, 0) },
        ];
        let iv = slots.place(Duration::minutes(45)).unwrap();
        assert_eq!(iv.start, hm(3, 0));
        // The smaller slot is untouched and still comes first.
        assert_eq!(slots.free_slots()[0].end, hm(1, 30));
        assert_eq!(slots.free_slots()[1].start, hm(3, 45));
    }

    #[test]
    fn non_positive_tasks_are_skipped_not_dropped() {
        let out = run(&[Commitment::work(-10)], &[DurationRequest::new("Nothing", 0)]);
        assert!(out.placed.is_empty());
        assert!(out.dropped.is_empty());
        assert_eq!(out.free_minutes(), DAY_MINUTES);
    }

    #[test]
    fn placed_tasks_never_overlap_and_stay_in_day() {
        let requests: Vec<_> = (0..40)
            .map(|i| DurationRequest::new(format!("task {i}"), 7 + (i * 37) % 95))
            .collect();
        let out = run(&[Commitment::sleep(450), Commitment::work(510)], &requests);
        let day = TimeInterval { start: hm(0, 0), end: hm(24, 0) };
        for (i, a) in out.placed.iter().enumerate() {
            assert!(day.encloses(&a.interval()));
            for b in out.placed.iter().skip(i + 1) {
                assert!(!a.interval().overlaps(&b.interval()), "{} vs {}", a.title, b.title);
            }
        }
        assert!(!out.dropped.is_empty());
    }
}
