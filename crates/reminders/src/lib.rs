pub mod error;
pub mod notify;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod types;

pub use {
    error::ReminderError,
    notify::{LogNotifier, Notification, Notifier, Permission},
    schedule::{Slot, due_slots},
    scheduler::{Clock, ReminderScheduler, SchedulerSettings, StartResult, SystemClock},
    store::{FileReminderStore, MemoryReminderStore, ReminderStore},
    types::{Day, ReminderConfig, ReminderKind, ReminderSchedule},
};
