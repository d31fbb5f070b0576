//! Task model for the daily routine.
//!
//! Only `pending` and `completed` are ever stored. Whether a task is upcoming,
//! current or overdue is derived from the wall clock at read time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::interval::TimeInterval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn toggled(self) -> Self {
        match self {
            TaskStatus::Pending => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "med" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Read-time classification of a task against "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskView {
    Upcoming,
    Current,
    Overdue,
    Completed,
}

impl fmt::Display for TaskView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskView::Upcoming => "upcoming",
            TaskView::Current => "in progress",
            TaskView::Overdue => "overdue",
            TaskView::Completed => "completed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Dense rank for manual list ordering. The allocator ignores it.
    #[serde(default)]
    pub order: usize,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        interval: TimeInterval,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start: interval.start,
            end: interval.end,
            priority: Priority::Medium,
            category_id: None,
            status: TaskStatus::Pending,
            order: 0,
            created_at,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category_id: Option<String>) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start,
            end: self.end,
        }
    }

    pub fn set_interval(&mut self, interval: TimeInterval) {
        self.start = interval.start;
        self.end = interval.end;
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn view(&self, now: DateTime<Utc>) -> TaskView {
        if self.is_completed() {
            TaskView::Completed
        } else if now < self.start {
            TaskView::Upcoming
        } else if now < self.end {
            TaskView::Current
        } else {
            TaskView::Overdue
        }
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.view(now) == TaskView::Current
    }
}

/// Append-only history record written the first time a task is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTask {
    #[serde(flatten)]
    pub task: ScheduledTask,
    pub completed_at: DateTime<Utc>,
}

impl CompletedTask {
    pub fn snapshot(task: &ScheduledTask, completed_at: DateTime<Utc>) -> Self {
        Self {
            task: task.clone(),
            completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}
