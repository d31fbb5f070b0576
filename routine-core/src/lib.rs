//! routine-core: scheduling engine for a personal daily routine.

pub mod allocator;
pub mod book;
pub mod error;
pub mod interval;
pub mod kernel;
pub mod overlap;
pub mod planner;
pub mod providers;
pub mod reminders;
pub mod stats;
pub mod task;
pub mod time;

pub use allocator::{allocate, Allocation, Commitment, CommitmentKind, Dropped, DurationRequest, FreeSlotAllocator};
pub use book::{SharedBook, StoreLookup, TaskBook, TaskEdit, Transition};
pub use error::{CoreError, ValidationError};
pub use interval::{overlaps_any, TimeInterval};
pub use kernel::RoutineKernel;
pub use overlap::{check_edit, validate, SchedulePreview};
pub use planner::{ClockEntry, DaySetup};
pub use providers::{
    Clock, FixedClock, IdGenerator, MemoryStore, Notifier, RecordingNotifier, SequentialIds,
    SystemClock, TaskLookup, TaskStore,
};
pub use reminders::{ReminderKind, ReminderPolicy, ReminderScheduler};
pub use stats::RoutineStats;
pub use task::{Category, CompletedTask, Priority, ScheduledTask, TaskStatus, TaskView};
