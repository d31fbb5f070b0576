//! Routine kernel: orchestration layer over the task book, the reminder
//! scheduler and the storage collaborator.
//!
//! Every mutation runs in the same order: validate and apply in memory,
//! re-derive reminders for the touched ids, then persist. A persistence
//! failure is returned to the caller but the in-memory change stands.
//! Completion records that could not be appended stay queued and are
//! retried on the next persist.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

use crate::book::{SharedBook, TaskBook, TaskEdit, Transition};
use crate::error::{CoreError, ValidationError};
use crate::overlap::SchedulePreview;
use crate::providers::{Clock, Notifier, TaskLookup, TaskStore};
use crate::reminders::{ReminderPolicy, ReminderScheduler};
use crate::task::{Category, CompletedTask, ScheduledTask};

pub struct RoutineKernel<S: TaskStore> {
    store: S,
    clock: Arc<dyn Clock>,
    book: SharedBook,
    categories: Vec<Category>,
    reminders: Option<ReminderScheduler>,
    unsaved_history: VecDeque<CompletedTask>,
}

impl<S: TaskStore> RoutineKernel<S> {
    /// Load tasks, history and categories from `store`. Reminders stay off
    /// until [`enable_reminders`](Self::enable_reminders).
    pub fn open(store: S, clock: Arc<dyn Clock>) -> Result<Self, CoreError> {
        let tasks = store.load_tasks()?;
        let history = store.load_history()?;
        let categories = store.load_categories()?;
        info!(
            tasks = tasks.len(),
            history = history.len(),
            categories = categories.len(),
            "routine loaded"
        );
        Ok(Self {
            store,
            clock,
            book: SharedBook::new(TaskBook::from_parts(tasks, history)),
            categories,
            reminders: None,
            unsaved_history: VecDeque::new(),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.book.read().tasks().to_vec()
    }

    pub fn history(&self) -> Vec<CompletedTask> {
        self.book.read().history().to_vec()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start a reminder scheduler and arm every task. Needs a tokio runtime.
    /// Timers re-read task status from this kernel's book.
    /// Returns the number of timers armed.
    pub fn enable_reminders(&mut self, notifier: Arc<dyn Notifier>, policy: ReminderPolicy) -> usize {
        let lookup = Arc::new(self.book.clone());
        self.enable_reminders_with(notifier, policy, lookup)
    }

    /// Like [`enable_reminders`](Self::enable_reminders), but timers re-read
    /// task status through `lookup` when they fire.
    pub fn enable_reminders_with(
        &mut self,
        notifier: Arc<dyn Notifier>,
        policy: ReminderPolicy,
        lookup: Arc<dyn TaskLookup>,
    ) -> usize {
        if !notifier.request_permission() {
            warn!("notification permission denied; reminders stay off");
            return 0;
        }
        let mut scheduler = ReminderScheduler::new(Arc::clone(&self.clock), notifier, lookup)
            .with_policy(policy);
        let armed = scheduler.arm_all(self.book.read().tasks());
        info!(armed, "reminders enabled");
        self.reminders = Some(scheduler);
        armed
    }

    pub fn arm_daily_summary(&mut self, tz: Tz) -> Result<bool, ValidationError> {
        match self.reminders.as_mut() {
            Some(r) => r.arm_daily_summary(tz),
            None => Ok(false),
        }
    }

    pub fn reminders(&self) -> Option<&ReminderScheduler> {
        self.reminders.as_ref()
    }

    fn rearm(&mut self, task: &ScheduledTask) {
        if let Some(r) = self.reminders.as_mut() {
            r.arm(task);
        }
    }

    fn disarm(&mut self, task_id: &str) {
        if let Some(r) = self.reminders.as_mut() {
            r.disarm(task_id);
        }
    }

    /// Save the list and append every queued completion record. History is
    /// attempted even when the list save fails; records that fail stay queued.
    fn persist(&mut self, recorded: Vec<CompletedTask>) -> Result<(), CoreError> {
        self.unsaved_history.extend(recorded);
        let snapshot = self.tasks();
        let saved = self.store.save_tasks(&snapshot);
        let flushed = self.flush_history();
        let result = saved.and(flushed);
        if let Err(err) = &result {
            warn!(
                error = %err,
                unsaved_history = self.unsaved_history.len(),
                "persisting routine failed; in-memory state kept"
            );
        }
        result
    }

    fn flush_history(&mut self) -> Result<(), CoreError> {
        while let Some(rec) = self.unsaved_history.front() {
            self.store.append_history(rec)?;
            self.unsaved_history.pop_front();
        }
        Ok(())
    }

    /// Pick up changes other processes wrote to the store. Timers for
    /// removed tasks are cancelled; new or changed tasks are re-armed.
    /// Returns how many task ids were touched.
    pub fn reload(&mut self) -> Result<usize, CoreError> {
        let tasks = self.store.load_tasks()?;
        let mut history = self.store.load_history()?;
        history.extend(self.unsaved_history.iter().cloned());

        let before: HashMap<String, ScheduledTask> = self
            .tasks()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        *self.book.write() = TaskBook::from_parts(tasks, history);

        let mut touched = 0;
        for id in before.keys() {
            let gone = self.book.read().get(id).is_none();
            if gone {
                self.disarm(id);
                touched += 1;
            }
        }
        for t in self.tasks() {
            if before.get(&t.id) != Some(&t) {
                self.rearm(&t);
                touched += 1;
            }
        }
        if touched > 0 {
            info!(touched, "reloaded routine from store");
        }
        Ok(touched)
    }

    /// Replace today's list with a previewed schedule.
    pub fn commit_schedule(&mut self, preview: SchedulePreview) -> Result<(), CoreError> {
        let tasks = preview.into_tasks();
        let old_ids: Vec<String> = self.book.read().tasks().iter().map(|t| t.id.clone()).collect();
        self.book.write().replace_all(tasks)?;
        for id in &old_ids {
            self.disarm(id);
        }
        for t in self.tasks() {
            self.rearm(&t);
        }
        info!(tasks = self.book.read().len(), "schedule committed");
        self.persist(Vec::new())
    }

    pub fn add(&mut self, task: ScheduledTask) -> Result<ScheduledTask, CoreError> {
        let added = self.book.write().add(task)?.clone();
        self.rearm(&added);
        self.persist(Vec::new())?;
        Ok(added)
    }

    pub fn edit(&mut self, id: &str, edit: TaskEdit) -> Result<ScheduledTask, CoreError> {
        let edited = self.book.write().edit(id, edit)?.clone();
        self.rearm(&edited);
        self.persist(Vec::new())?;
        Ok(edited)
    }

    pub fn toggle(&mut self, id: &str) -> Result<Transition, CoreError> {
        let now = self.now();
        let transition = self.book.write().toggle(id, now)?;
        self.rearm(&transition.task);
        let recorded: Vec<CompletedTask> = transition.recorded.iter().cloned().collect();
        self.persist(recorded)?;
        Ok(transition)
    }

    pub fn complete_many(&mut self, ids: &[String]) -> Result<Vec<Transition>, CoreError> {
        let now = self.now();
        let transitions = self.book.write().complete_many(ids, now)?;
        for t in &transitions {
            self.rearm(&t.task);
        }
        let recorded: Vec<CompletedTask> = transitions
            .iter()
            .filter_map(|t| t.recorded.clone())
            .collect();
        self.persist(recorded)?;
        Ok(transitions)
    }

    pub fn delete(&mut self, id: &str) -> Result<ScheduledTask, CoreError> {
        let removed = self.book.write().delete(id)?;
        self.disarm(&removed.id);
        self.persist(Vec::new())?;
        Ok(removed)
    }

    pub fn reorder(&mut self, id: &str, new_index: usize) -> Result<(), CoreError> {
        self.book.write().reorder(id, new_index)?;
        self.persist(Vec::new())
    }

    pub fn add_category(&mut self, category: Category) -> Result<(), CoreError> {
        if category.name.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        match self.categories.iter_mut().find(|c| c.id == category.id) {
            Some(existing) => *existing = category,
            None => self.categories.push(category),
        }
        self.store.save_categories(&self.categories)
    }

    pub fn category_name(&self, id: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::TimeInterval;
    use crate::providers::{FixedClock, MemoryStore, RecordingNotifier};
    use crate::task::TaskStatus;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn task(id: &str, start_min: i64, end_min: i64) -> ScheduledTask {
        let iv = TimeInterval::new(
            t0() + Duration::minutes(start_min),
            t0() + Duration::minutes(end_min),
        )
        .unwrap();
        ScheduledTask::new(id, format!("Task {id}"), iv, t0())
    }

    fn kernel(tasks: Vec<ScheduledTask>) -> RoutineKernel<MemoryStore> {
        RoutineKernel::open(
            MemoryStore::with_tasks(tasks),
            Arc::new(FixedClock::new(t0())),
        )
        .unwrap()
    }

    #[test]
    fn toggle_persists_tasks_and_history_once() {
        let mut k = kernel(vec![task("a", 0, 30)]);
        k.toggle("a").unwrap();
        k.toggle("a").unwrap();
        k.toggle("a").unwrap();

        let stored = k.store().load_tasks().unwrap();
        assert_eq!(stored[0].status, TaskStatus::Completed);
        assert_eq!(k.store().load_history().unwrap().len(), 1);
    }

    #[test]
    fn persistence_failure_keeps_in_memory_change() {
        let mut k = kernel(vec![task("a", 0, 30)]);
        k.store().fail_saves(true);
        let err = k.toggle("a").unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));
        assert!(k.book().read().get("a").unwrap().is_completed());
    }

    #[test]
    fn validation_failure_is_surfaced_and_nothing_saved() {
        let mut k = kernel(vec![task("a", 0, 30), task("b", 60, 90)]);
        let edit = TaskEdit {
            interval: Some(TimeInterval::new(t0() + Duration::minutes(70), t0() + Duration::minutes(80)).unwrap()),
            ..Default::default()
        };
        let err = k.edit("a", edit).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Overlap { .. })));
        assert_eq!(k.store().load_tasks().unwrap()[0].end, t0() + Duration::minutes(30));
    }

    #[test]
    fn categories_upsert_and_resolve() {
        let mut k = kernel(vec![]);
        k.add_category(Category::new("health", "Health")).unwrap();
        k.add_category(Category::new("health", "Health & fitness").with_color("#0a0")).unwrap();
        assert_eq!(k.categories().len(), 1);
        assert_eq!(k.category_name("health"), Some("Health & fitness"));
        assert_eq!(k.store().load_categories().unwrap().len(), 1);
        assert!(k.add_category(Category::new("x", "")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_disarms_reminders() {
        let mut k = kernel(vec![task("a", 5, 65), task("b", 10, 20)]);
        let notifier = Arc::new(RecordingNotifier::new());
        assert_eq!(k.enable_reminders(notifier.clone(), ReminderPolicy::default()), 4);

        k.delete("a").unwrap();
        let reminders = k.reminders().unwrap();
        assert_eq!(reminders.live_timers("a"), 0);
        assert_eq!(reminders.live_timers("b"), 2);

        tokio::time::sleep(std::time::Duration::from_secs(70 * 60)).await;
        tokio::task::yield_now().await;
        let tags: Vec<String> = notifier.shown().into_iter().map(|s| s.tag).collect();
        assert_eq!(tags, vec!["start-b", "end-b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_schedule_replaces_timers() {
        let mut k = kernel(vec![task("old", 5, 10)]);
        k.enable_reminders(Arc::new(RecordingNotifier::new()), ReminderPolicy::default());
        k.commit_schedule(SchedulePreview::new(vec![task("new", 30, 60)])).unwrap();

        let reminders = k.reminders().unwrap();
        assert_eq!(reminders.live_timers("old"), 0);
        assert_eq!(reminders.live_timers("new"), 2);
        assert_eq!(k.store().load_tasks().unwrap()[0].id, "new");
    }

    #[test]
    fn failed_history_append_is_retried_on_next_save() {
        let mut k = kernel(vec![task("a", 0, 30), task("b", 60, 90)]);
        k.store().fail_saves(true);
        assert!(k.toggle("a").is_err());
        assert_eq!(k.unsaved_history.len(), 1);

        k.store().fail_saves(false);
        k.toggle("a").unwrap();
        k.toggle("a").unwrap();

        let stored = k.store().load_history().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].task.id, "a");
        assert!(k.unsaved_history.is_empty());
        assert_eq!(k.store().load_tasks().unwrap()[0].status, TaskStatus::Completed);
    }

    #[test]
    fn queued_history_flushes_even_when_nothing_new_completes() {
        let mut k = kernel(vec![task("a", 0, 30), task("b", 60, 90)]);
        k.store().fail_saves(true);
        assert!(k.toggle("a").is_err());
        k.store().fail_saves(false);
        k.reorder("b", 0).unwrap();
        assert_eq!(k.store().load_history().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_follows_changes_from_another_kernel() {
        let store = Arc::new(MemoryStore::with_tasks(vec![task("a", 5, 65), task("b", 10, 20)]));
        let clock = Arc::new(FixedClock::new(t0()));
        let mut watcher = RoutineKernel::open(Arc::clone(&store), clock.clone()).unwrap();
        let mut writer = RoutineKernel::open(Arc::clone(&store), clock).unwrap();
        watcher.enable_reminders(Arc::new(RecordingNotifier::new()), ReminderPolicy::default());

        writer.delete("b").unwrap();
        writer.add(task("c", 30, 40)).unwrap();
        writer.toggle("a").unwrap();

        assert_eq!(watcher.reload().unwrap(), 3);
        assert!(watcher.book().read().get("a").unwrap().is_completed());
        let reminders = watcher.reminders().unwrap();
        assert_eq!(reminders.live_timers("b"), 0);
        assert_eq!(reminders.live_timers("c"), 2);
        assert_eq!(watcher.reload().unwrap(), 0);
    }
}
