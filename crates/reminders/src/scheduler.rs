//! The reminder loop.
//!
//! One [`ReminderScheduler`] exists per process. It is started when a user
//! session begins (or at boot when reminders are enabled) and stopped on
//! logout or shutdown.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use {
    chrono::{DateTime, TimeDelta, Utc},
    tokio::{
        sync::Mutex as AsyncMutex,
        task::JoinHandle,
        time::MissedTickBehavior,
    },
    tracing::{debug, info, warn},
};

use crate::{
    error::ReminderError,
    notify::{Notification, Notifier, Permission},
    schedule::{Slot, due_slots},
    store::ReminderStore,
};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub catch_up: TimeDelta,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            catch_up: TimeDelta::minutes(15),
        }
    }
}

/// What `start()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResult {
    Started,
    AlreadyRunning,
    /// The host did not grant notification permission; nothing scheduled.
    PermissionNotGranted(Permission),
}

pub struct ReminderScheduler {
    store: Arc<dyn ReminderStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    fired: AsyncMutex<HashSet<Slot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        notifier: Arc<dyn Notifier>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Self::with_clock(store, notifier, Arc::new(SystemClock), settings)
    }

    pub fn with_clock(
        store: Arc<dyn ReminderStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            notifier,
            clock,
            settings,
            fired: AsyncMutex::new(HashSet::new()),
            task: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<dyn ReminderStore> {
        &self.store
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start the loop unless it is already running. Asks for notification
    /// permission if it has not been decided yet.
    pub async fn start(self: &Arc<Self>) -> StartResult {
        if self.is_active() {
            debug!("reminder loop already running");
            return StartResult::AlreadyRunning;
        }

        let permission = match self.notifier.permission() {
            Permission::Default => self.notifier.request_permission().await,
            other => other,
        };
        if permission != Permission::Granted {
            warn!(?permission, "notification permission not granted, reminders not scheduled");
            return StartResult::PermissionNotGranted(permission);
        }

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return StartResult::AlreadyRunning;
        }
        let weak = Arc::downgrade(self);
        let period = self.settings.tick_interval;
        *task = Some(tokio::spawn(run_loop(weak, period)));

        info!(interval_secs = period.as_secs(), "reminder loop started");
        StartResult::Started
    }

    /// Cancel the loop. Returns whether it was running.
    pub fn stop(&self) -> bool {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                handle.abort();
                info!("reminder loop stopped");
                true
            },
            None => false,
        }
    }

    /// Run one evaluation against the clock.
    pub async fn tick(&self) -> Result<Vec<Slot>, ReminderError> {
        self.tick_at(self.clock.now()).await
    }

    /// Fire every due slot at `now` that has not fired yet. Returns the
    /// slots notified on this call.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<Vec<Slot>, ReminderError> {
        if self.notifier.permission() != Permission::Granted {
            debug!("notification permission not granted, skipping tick");
            return Ok(Vec::new());
        }

        let config = self.store.load().await?;
        let due = due_slots(&config, now, self.settings.catch_up);

        let mut fired = self.fired.lock().await;
        let today = now.with_timezone(&config.timezone()).date_naive();
        fired.retain(|slot| slot.date >= today);

        let mut sent = Vec::new();
        for slot in due {
            if fired.contains(&slot) {
                continue;
            }
            match self
                .notifier
                .notify(&Notification::reminder(slot.kind, now))
                .await
            {
                Ok(()) => {
                    debug!(kind = %slot.kind, date = %slot.date, "reminder fired");
                    fired.insert(slot);
                    sent.push(slot);
                },
                Err(e) => warn!(kind = %slot.kind, error = %e, "failed to deliver reminder"),
            }
        }
        Ok(sent)
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn run_loop(scheduler: Weak<ReminderScheduler>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(scheduler) = scheduler.upgrade() else {
            break;
        };
        if let Err(e) = scheduler.tick().await {
            warn!(error = %e, "reminder tick failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            store::MemoryReminderStore,
            types::{ReminderConfig, ReminderKind, ReminderSchedule},
        },
        async_trait::async_trait,
        chrono::{NaiveTime, TimeZone},
        std::collections::{BTreeMap, BTreeSet},
    };

    struct TestNotifier {
        permission: Mutex<Permission>,
        grant_on_request: bool,
        fail: Mutex<bool>,
        sent: Mutex<Vec<Notification>>,
    }

    impl TestNotifier {
        fn new(permission: Permission) -> Arc<Self> {
            Arc::new(Self {
                permission: Mutex::new(permission),
                grant_on_request: true,
                fail: Mutex::new(false),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for TestNotifier {
        fn permission(&self) -> Permission {
            *self.permission.lock().unwrap()
        }

        async fn request_permission(&self) -> Permission {
            let mut p = self.permission.lock().unwrap();
            if *p == Permission::Default && self.grant_on_request {
                *p = Permission::Granted;
            }
            *p
        }

        async fn notify(&self, notification: &Notification) -> Result<(), ReminderError> {
            if *self.fail.lock().unwrap() {
                return Err(ReminderError::Delivery("offline".into()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    // 2025-03-03 is a Monday.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, m, 0).unwrap()
    }

    fn water_at_ten() -> ReminderConfig {
        ReminderConfig {
            enabled: true,
            kinds: BTreeSet::from([ReminderKind::Water]),
            schedules: BTreeMap::from([(
                ReminderKind::Water,
                ReminderSchedule::daily(NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
            )]),
            timezone: None,
        }
    }

    fn scheduler(notifier: Arc<TestNotifier>, now: DateTime<Utc>) -> Arc<ReminderScheduler> {
        ReminderScheduler::with_clock(
            Arc::new(MemoryReminderStore::new(water_at_ten())),
            notifier,
            Arc::new(FixedClock(now)),
            SchedulerSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let sched = scheduler(TestNotifier::new(Permission::Granted), monday(8, 0));
        assert_eq!(sched.start().await, StartResult::Started);
        assert_eq!(sched.start().await, StartResult::AlreadyRunning);
        assert!(sched.is_active());

        assert!(sched.stop());
        assert!(!sched.is_active());
        assert!(!sched.stop());
    }

    #[tokio::test]
    async fn test_denied_permission_skips_scheduling() {
        let sched = scheduler(TestNotifier::new(Permission::Denied), monday(8, 0));
        assert_eq!(
            sched.start().await,
            StartResult::PermissionNotGranted(Permission::Denied)
        );
        assert!(!sched.is_active());
    }

    #[tokio::test]
    async fn test_default_permission_is_requested() {
        let notifier = TestNotifier::new(Permission::Default);
        let sched = scheduler(notifier.clone(), monday(8, 0));
        assert_eq!(sched.start().await, StartResult::Started);
        assert_eq!(notifier.permission(), Permission::Granted);
        sched.stop();
    }

    #[tokio::test]
    async fn test_slot_fires_once() {
        let notifier = TestNotifier::new(Permission::Granted);
        let sched = scheduler(notifier.clone(), monday(10, 1));

        assert_eq!(sched.tick_at(monday(10, 1)).await.unwrap().len(), 1);
        assert!(sched.tick_at(monday(10, 2)).await.unwrap().is_empty());
        assert!(sched.tick_at(monday(10, 14)).await.unwrap().is_empty());
        assert_eq!(notifier.sent(), 1);

        // Next day is a new slot.
        let tuesday = monday(10, 3) + TimeDelta::days(1);
        assert_eq!(sched.tick_at(tuesday).await.unwrap().len(), 1);
        assert_eq!(notifier.sent(), 2);
    }

    #[tokio::test]
    async fn test_previous_dates_are_pruned() {
        let notifier = TestNotifier::new(Permission::Granted);
        let sched = scheduler(notifier.clone(), monday(10, 1));

        sched.tick_at(monday(10, 1)).await.unwrap();
        assert_eq!(sched.fired.lock().await.len(), 1);

        // Tuesday morning, before anything is due.
        let tuesday = monday(8, 0) + TimeDelta::days(1);
        assert!(sched.tick_at(tuesday).await.unwrap().is_empty());
        assert!(sched.fired.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried() {
        let notifier = TestNotifier::new(Permission::Granted);
        let sched = scheduler(notifier.clone(), monday(10, 1));

        *notifier.fail.lock().unwrap() = true;
        assert!(sched.tick_at(monday(10, 1)).await.unwrap().is_empty());

        *notifier.fail.lock().unwrap() = false;
        assert_eq!(sched.tick_at(monday(10, 2)).await.unwrap().len(), 1);
        assert_eq!(notifier.sent(), 1);
    }

    #[tokio::test]
    async fn test_revoked_permission_skips_tick() {
        let notifier = TestNotifier::new(Permission::Granted);
        let sched = scheduler(notifier.clone(), monday(10, 1));
        *notifier.permission.lock().unwrap() = Permission::Denied;

        assert!(sched.tick_at(monday(10, 1)).await.unwrap().is_empty());
        assert_eq!(notifier.sent(), 0);
    }

    #[tokio::test]
    async fn test_tick_reads_latest_config() {
        let notifier = TestNotifier::new(Permission::Granted);
        let sched = scheduler(notifier.clone(), monday(10, 1));

        let mut cfg = water_at_ten();
        cfg.enabled = false;
        sched.store().save(&cfg).await.unwrap();
        assert!(sched.tick_at(monday(10, 1)).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_fires_due_reminder_once() {
        let notifier = TestNotifier::new(Permission::Granted);
        let sched = scheduler(notifier.clone(), monday(10, 1));
        assert_eq!(sched.start().await, StartResult::Started);

        tokio::time::sleep(Duration::from_secs(181)).await;
        assert_eq!(notifier.sent(), 1);
        assert!(sched.is_active());
        sched.stop();
    }
}
