//! Overlap validation for manual edits of an allocated schedule.

use crate::allocator::{Allocation, Dropped};
use crate::error::ValidationError;
use crate::interval::{overlaps_any, TimeInterval};
use crate::task::ScheduledTask;

/// True iff `candidate` overlaps any of `others`.
pub fn validate(candidate: &TimeInterval, others: &[TimeInterval]) -> bool {
    overlaps_any(candidate, others)
}

/// First task (other than `task_id` itself) that `candidate` would collide with.
pub fn find_conflict<'a>(
    task_id: &str,
    candidate: &TimeInterval,
    schedule: &'a [ScheduledTask],
) -> Option<&'a ScheduledTask> {
    schedule
        .iter()
        .filter(|t| t.id != task_id)
        .find(|t| candidate.overlaps(&t.interval()))
}

/// Reject moving `task_id` to `candidate` if it would overlap another task.
pub fn check_edit(
    task_id: &str,
    candidate: &TimeInterval,
    schedule: &[ScheduledTask],
) -> Result<(), ValidationError> {
    match find_conflict(task_id, candidate, schedule) {
        Some(other) => Err(ValidationError::Overlap {
            task_id: task_id.to_string(),
            conflicting_id: other.id.clone(),
        }),
        None => Ok(()),
    }
}

/// Allocator output the user can still adjust before committing it.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePreview {
    tasks: Vec<ScheduledTask>,
    dropped: Vec<Dropped>,
}

impl SchedulePreview {
    pub fn new(tasks: Vec<ScheduledTask>) -> Self {
        Self {
            tasks,
            dropped: Vec::new(),
        }
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn dropped(&self) -> &[Dropped] {
        &self.dropped
    }

    /// Move one task to a new interval. On overlap nothing changes.
    pub fn edit(&mut self, task_id: &str, interval: TimeInterval) -> Result<(), ValidationError> {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| ValidationError::UnknownTask(task_id.to_string()))?;
        check_edit(task_id, &interval, &self.tasks)?;
        self.tasks[idx].set_interval(interval);
        self.tasks.sort_by_key(|t| t.start);
        for (i, t) in self.tasks.iter_mut().enumerate() {
            t.order = i;
        }
        Ok(())
    }

    pub fn into_tasks(self) -> Vec<ScheduledTask> {
        self.tasks
    }
}

impl From<Allocation> for SchedulePreview {
    fn from(allocation: Allocation) -> Self {
        Self {
            tasks: allocation.placed,
            dropped: allocation.dropped,
        }
    }
}
