use std::{sync::Arc, time::Duration};

use {
    chrono::TimeDelta,
    fittrack_config::FitTrackConfig,
    fittrack_oauth::{
        CallbackReconciler, ConsumedCodeLedger, OAuthFlow, ReconcileSettings, SessionExchanger,
    },
    fittrack_reminders::{ReminderScheduler, ReminderStore, SchedulerSettings, StartResult},
    tracing::debug,
};

use crate::{notifications::BroadcastNotifier, session::SessionStore};

/// Shared state behind every route.
pub struct GatewayState {
    pub config: FitTrackConfig,
    pub flow: OAuthFlow,
    pub exchanger: Arc<dyn SessionExchanger>,
    pub ledger: ConsumedCodeLedger,
    pub sessions: SessionStore,
    pub notifier: Arc<BroadcastNotifier>,
    pub scheduler: Arc<ReminderScheduler>,
}

impl GatewayState {
    pub fn new(
        config: FitTrackConfig,
        exchanger: Arc<dyn SessionExchanger>,
        reminder_store: Arc<dyn ReminderStore>,
    ) -> Arc<Self> {
        let callback_url = format!(
            "{}/auth/callback",
            config.server.public_url.trim_end_matches('/')
        );
        let flow = OAuthFlow::new(
            &config.auth.supabase_url,
            &callback_url,
            config.auth.providers.clone(),
        );
        let ledger =
            ConsumedCodeLedger::new(Duration::from_secs(config.auth.consumed_ttl_secs));
        let notifier = Arc::new(BroadcastNotifier::new(64));
        let scheduler = ReminderScheduler::new(
            reminder_store,
            notifier.clone(),
            SchedulerSettings {
                tick_interval: Duration::from_secs(config.reminders.tick_interval_secs.max(1)),
                catch_up: TimeDelta::minutes(i64::from(config.reminders.catch_up_minutes)),
            },
        );

        Arc::new(Self {
            config,
            flow,
            exchanger,
            ledger,
            sessions: SessionStore::new(),
            notifier,
            scheduler,
        })
    }

    /// A fresh reconciler for one callback invocation.
    pub fn reconciler(&self) -> CallbackReconciler {
        CallbackReconciler::new(
            Arc::clone(&self.exchanger),
            self.ledger.clone(),
            ReconcileSettings {
                default_next: self.config.auth.default_next.clone(),
                timeout: Duration::from_secs(self.config.auth.exchange_timeout_secs),
            },
        )
    }

    pub fn error_page(&self) -> &str {
        &self.config.auth.error_page
    }

    /// Start the reminder loop if the user has reminders switched on.
    pub async fn start_reminders_if_enabled(&self) -> Option<StartResult> {
        match self.scheduler.store().load().await {
            Ok(cfg) if cfg.enabled => Some(self.scheduler.start().await),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "could not read reminder config");
                None
            },
        }
    }
}
