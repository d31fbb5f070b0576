//! TaskBook: the live task list plus its append-only completion history.
//!
//! Every mutation is validated in full before anything is written, so a
//! rejected call leaves the book exactly as it was.
//!
//! Ordering: tasks are kept by their dense `order` rank (0..n). Adding,
//! deleting and reordering re-number ranks; editing times does not.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::error::ValidationError;
use crate::interval::TimeInterval;
use crate::overlap::check_edit;
use crate::providers::{TaskLookup, TaskStore};
use crate::task::{CompletedTask, Priority, ScheduledTask, TaskStatus, TaskView};

/// Field changes for [`TaskBook::edit`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub interval: Option<TimeInterval>,
    pub priority: Option<Priority>,
    /// `Some(None)` clears the category.
    pub category_id: Option<Option<String>>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.interval.is_none()
            && self.priority.is_none()
            && self.category_id.is_none()
    }
}

/// Outcome of a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub task: ScheduledTask,
    /// Set only on the first completion of this task id.
    pub recorded: Option<CompletedTask>,
}

#[derive(Debug, Default, Clone)]
pub struct TaskBook {
    tasks: Vec<ScheduledTask>,
    history: Vec<CompletedTask>,
    recorded_ids: HashSet<String>,
}

fn validate_task(task: &ScheduledTask) -> Result<(), ValidationError> {
    if task.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    TimeInterval::new(task.start, task.end)?;
    Ok(())
}

impl TaskBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted state. Tasks are ranked by their stored `order`.
    pub fn from_parts(mut tasks: Vec<ScheduledTask>, history: Vec<CompletedTask>) -> Self {
        tasks.sort_by_key(|t| (t.order, t.start));
        let recorded_ids = history.iter().map(|h| h.task.id.clone()).collect();
        let mut book = Self {
            tasks,
            history,
            recorded_ids,
        };
        book.renumber();
        book
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn history(&self) -> &[CompletedTask] {
        &self.history
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn position(&self, id: &str) -> Result<usize, ValidationError> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))
    }

    fn renumber(&mut self) {
        for (i, t) in self.tasks.iter_mut().enumerate() {
            t.order = i;
        }
    }

    /// Replace the whole list, e.g. with a freshly committed schedule.
    /// History is kept.
    pub fn replace_all(&mut self, tasks: Vec<ScheduledTask>) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for t in &tasks {
            validate_task(t)?;
            if !seen.insert(t.id.as_str()) {
                return Err(ValidationError::DuplicateTask(t.id.clone()));
            }
        }
        self.tasks = tasks;
        self.renumber();
        Ok(())
    }

    /// Append a task (clock mode). Overlaps are allowed here; only edits of an
    /// existing schedule are overlap-checked.
    pub fn add(&mut self, task: ScheduledTask) -> Result<&ScheduledTask, ValidationError> {
        validate_task(&task)?;
        if self.get(&task.id).is_some() {
            return Err(ValidationError::DuplicateTask(task.id));
        }
        self.tasks.push(task);
        self.renumber();
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    /// Apply `edit` to one task. Rejected edits (empty title, bad range,
    /// overlap with another task) change nothing.
    pub fn edit(&mut self, id: &str, edit: TaskEdit) -> Result<&ScheduledTask, ValidationError> {
        let idx = self.position(id)?;
        let mut candidate = self.tasks[idx].clone();
        if let Some(title) = edit.title {
            candidate.title = title;
        }
        if let Some(interval) = edit.interval {
            candidate.set_interval(interval);
        }
        if let Some(priority) = edit.priority {
            candidate.priority = priority;
        }
        if let Some(category_id) = edit.category_id {
            candidate.category_id = category_id;
        }
        validate_task(&candidate)?;
        check_edit(id, &candidate.interval(), &self.tasks)?;

        self.tasks[idx] = candidate;
        Ok(&self.tasks[idx])
    }

    /// `pending <-> completed`. Only the first completion of an id is recorded.
    pub fn toggle(&mut self, id: &str, now: DateTime<Utc>) -> Result<Transition, ValidationError> {
        let idx = self.position(id)?;
        let next = self.tasks[idx].status.toggled();
        Ok(self.set_status(idx, next, now))
    }

    /// Bulk completion. Unknown ids reject the whole batch.
    pub fn complete_many(
        &mut self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Transition>, ValidationError> {
        let positions = ids
            .iter()
            .map(|id| self.position(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(positions
            .into_iter()
            .map(|idx| self.set_status(idx, TaskStatus::Completed, now))
            .collect())
    }

    fn set_status(&mut self, idx: usize, status: TaskStatus, now: DateTime<Utc>) -> Transition {
        self.tasks[idx].status = status;
        let task = self.tasks[idx].clone();

        let recorded = if status == TaskStatus::Completed && !self.recorded_ids.contains(&task.id) {
            let rec = CompletedTask::snapshot(&task, now);
            self.recorded_ids.insert(task.id.clone());
            self.history.push(rec.clone());
            Some(rec)
        } else {
            None
        };

        Transition { task, recorded }
    }

    pub fn delete(&mut self, id: &str) -> Result<ScheduledTask, ValidationError> {
        let idx = self.position(id)?;
        let removed = self.tasks.remove(idx);
        self.renumber();
        Ok(removed)
    }

    /// Move a task to `new_index` in the manual ordering.
    pub fn reorder(&mut self, id: &str, new_index: usize) -> Result<(), ValidationError> {
        let idx = self.position(id)?;
        if new_index >= self.tasks.len() {
            return Err(ValidationError::IndexOutOfBounds {
                index: new_index,
                len: self.tasks.len(),
            });
        }
        let task = self.tasks.remove(idx);
        self.tasks.insert(new_index, task);
        self.renumber();
        Ok(())
    }

    /// Tasks whose interval contains `now` and are not completed.
    pub fn current(&self, now: DateTime<Utc>) -> Vec<&ScheduledTask> {
        self.tasks.iter().filter(|t| t.is_current(now)).collect()
    }

    pub fn views(&self, now: DateTime<Utc>) -> Vec<(&ScheduledTask, TaskView)> {
        self.tasks.iter().map(|t| (t, t.view(now))).collect()
    }
}

/// The book shared between the kernel (writer) and reminder timers (readers).
#[derive(Debug, Clone, Default)]
pub struct SharedBook(Arc<RwLock<TaskBook>>);

impl SharedBook {
    pub fn new(book: TaskBook) -> Self {
        Self(Arc::new(RwLock::new(book)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TaskBook> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TaskBook> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskLookup for SharedBook {
    fn lookup(&self, task_id: &str) -> Option<ScheduledTask> {
        self.read().get(task_id).cloned()
    }

    fn snapshot(&self) -> Vec<ScheduledTask> {
        self.read().tasks().to_vec()
    }
}

/// Reads tasks from the store at lookup time, so a timer sees changes other
/// processes persisted since this one loaded. Falls back to the in-memory
/// book when the store cannot be read.
pub struct StoreLookup<S> {
    store: S,
    fallback: SharedBook,
}

impl<S: TaskStore> StoreLookup<S> {
    pub fn new(store: S, fallback: SharedBook) -> Self {
        Self { store, fallback }
    }
}

impl<S: TaskStore + Send + Sync + 'static> TaskLookup for StoreLookup<S> {
    fn lookup(&self, task_id: &str) -> Option<ScheduledTask> {
        match self.store.load_tasks() {
            Ok(tasks) => tasks.into_iter().find(|t| t.id == task_id),
            Err(err) => {
                warn!(error = %err, task_id, "store unreadable; using in-memory task");
                self.fallback.lookup(task_id)
            }
        }
    }

    fn snapshot(&self) -> Vec<ScheduledTask> {
        match self.store.load_tasks() {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %err, "store unreadable; using in-memory tasks");
                self.fallback.snapshot()
            }
        }
    }
}
