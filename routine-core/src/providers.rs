//! Collaborator seams: storage, notifications, ids, and the clock.
//!
//! The core never touches the filesystem, the desktop, or the wall clock
//! directly; callers plug concrete adapters in through these traits.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::CoreError;
use crate::task::{Category, CompletedTask, ScheduledTask};

/// Persistence collaborator. `save_tasks` replaces the whole list.
pub trait TaskStore {
    fn load_tasks(&self) -> Result<Vec<ScheduledTask>, CoreError>;
    fn save_tasks(&self, tasks: &[ScheduledTask]) -> Result<(), CoreError>;
    fn load_history(&self) -> Result<Vec<CompletedTask>, CoreError>;
    fn append_history(&self, record: &CompletedTask) -> Result<(), CoreError>;
    fn load_categories(&self) -> Result<Vec<Category>, CoreError>;
    fn save_categories(&self, categories: &[Category]) -> Result<(), CoreError>;
}

/// Several kernels (or a kernel and a lookup) can share one store.
impl<S: TaskStore + ?Sized> TaskStore for Arc<S> {
    fn load_tasks(&self) -> Result<Vec<ScheduledTask>, CoreError> {
        (**self).load_tasks()
    }

    fn save_tasks(&self, tasks: &[ScheduledTask]) -> Result<(), CoreError> {
        (**self).save_tasks(tasks)
    }

    fn load_history(&self) -> Result<Vec<CompletedTask>, CoreError> {
        (**self).load_history()
    }

    fn append_history(&self, record: &CompletedTask) -> Result<(), CoreError> {
        (**self).append_history(record)
    }

    fn load_categories(&self) -> Result<Vec<Category>, CoreError> {
        (**self).load_categories()
    }

    fn save_categories(&self, categories: &[Category]) -> Result<(), CoreError> {
        (**self).save_categories(categories)
    }
}

/// Notification collaborator. Permission is the adapter's concern.
pub trait Notifier: Send + Sync {
    fn request_permission(&self) -> bool {
        true
    }

    fn show(&self, title: &str, body: &str, tag: &str);
}

pub trait IdGenerator {
    fn next_id(&self) -> String;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Read access to the live task list, used by timers at fire time.
pub trait TaskLookup: Send + Sync + 'static {
    fn lookup(&self, task_id: &str) -> Option<ScheduledTask>;
    fn snapshot(&self) -> Vec<ScheduledTask>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests and previews.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `{prefix}-1`, `{prefix}-2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

/// In-memory store. Can be told to fail saves to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<ScheduledTask>>,
    history: Mutex<Vec<CompletedTask>>,
    categories: Mutex<Vec<Category>>,
    fail_saves: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<ScheduledTask>) -> Self {
        let store = Self::default();
        *store.tasks.lock().unwrap_or_else(|e| e.into_inner()) = tasks;
        store
    }

    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    fn check(&self, operation: &str) -> Result<(), CoreError> {
        if *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(CoreError::persistence(operation, "store unavailable"));
        }
        Ok(())
    }
}

impl TaskStore for MemoryStore {
    fn load_tasks(&self) -> Result<Vec<ScheduledTask>, CoreError> {
        Ok(self.tasks.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save_tasks(&self, tasks: &[ScheduledTask]) -> Result<(), CoreError> {
        self.check("save_tasks")?;
        *self.tasks.lock().unwrap_or_else(|e| e.into_inner()) = tasks.to_vec();
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<CompletedTask>, CoreError> {
        Ok(self.history.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn append_history(&self, record: &CompletedTask) -> Result<(), CoreError> {
        self.check("append_history")?;
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }

    fn load_categories(&self) -> Result<Vec<Category>, CoreError> {
        Ok(self.categories.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save_categories(&self, categories: &[Category]) -> Result<(), CoreError> {
        self.check("save_categories")?;
        *self.categories.lock().unwrap_or_else(|e| e.into_inner()) = categories.to_vec();
        Ok(())
    }
}

/// One notification as shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shown {
    pub title: String,
    pub body: String,
    pub tag: String,
}

/// Notifier that records everything it is asked to show.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<Shown>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<Shown> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.shown().into_iter().map(|s| s.title).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, title: &str, body: &str, tag: &str) {
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Shown {
                title: title.to_string(),
                body: body.to_string(),
                tag: tag.to_string(),
            });
    }
}
