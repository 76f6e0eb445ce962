//! Resolve an identity-provider redirect into exactly one navigation.
//!
//! Both the server redirect handler and the client-side exchange endpoint
//! run [`CallbackReconciler::reconcile`]. Each runs at most once per
//! instance; across instances the [`ConsumedCodeLedger`] makes sure a code
//! is exchanged once and every path converges on the same outcome.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, error, info, warn};

use crate::{
    exchange::{ExchangeError, SessionExchanger},
    ledger::{Claim, ClaimGuard, ConsumedCodeLedger, Settlement},
    navigation::{Navigation, Navigator, sanitize_next},
    types::{CallbackParams, Session},
};

const TIMEOUT_DESCRIPTION: &str = "Sign-in took too long. Please try again.";
const UNEXPECTED_DESCRIPTION: &str = "Something went wrong while signing you in. Please try again.";

/// Knobs shared by every reconciler instance.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub default_next: String,
    pub timeout: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            default_next: "/home".into(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Terminal state of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    ProviderError { code: String, description: String },
    /// No code and no error: an already-authenticated reload.
    NoCode,
    Succeeded,
    /// Another path already exchanged the code.
    AlreadyConsumed,
    ExchangeFailed(String),
    TimedOut,
    Unexpected(String),
}

impl Outcome {
    /// Outcomes that send the user on to `next`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::NoCode | Self::Succeeded | Self::AlreadyConsumed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ProviderError { .. } => "provider_error",
            Self::NoCode => "no_code",
            Self::Succeeded => "succeeded",
            Self::AlreadyConsumed => "already_consumed",
            Self::ExchangeFailed(_) => "exchange_failed",
            Self::TimedOut => "timeout",
            Self::Unexpected(_) => "unexpected_error",
        }
    }

    pub fn navigation(&self, next: &str) -> Navigation {
        match self {
            Self::NoCode | Self::Succeeded | Self::AlreadyConsumed => {
                Navigation::Destination(next.to_string())
            },
            Self::ProviderError { code, description } => Navigation::error(code, description),
            Self::ExchangeFailed(message) => Navigation::error("exchange_failed", message),
            Self::TimedOut => Navigation::error("timeout", TIMEOUT_DESCRIPTION),
            Self::Unexpected(_) => Navigation::error("unexpected_error", UNEXPECTED_DESCRIPTION),
        }
    }
}

/// Outcome plus the session, when this path is the one that created it.
#[derive(Debug)]
pub struct Reconciled {
    pub outcome: Outcome,
    pub session: Option<Session>,
    pub navigation: Navigation,
}

/// Provider wording for a code that was used or timed out on its side.
fn is_already_consumed(message: &str) -> bool {
    message.contains("already") || message.contains("expired")
}

/// One reconciler per entry-point invocation.
pub struct CallbackReconciler {
    exchanger: Arc<dyn SessionExchanger>,
    ledger: ConsumedCodeLedger,
    settings: ReconcileSettings,
    fired: AtomicBool,
}

impl CallbackReconciler {
    pub fn new(
        exchanger: Arc<dyn SessionExchanger>,
        ledger: ConsumedCodeLedger,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            exchanger,
            ledger,
            settings,
            fired: AtomicBool::new(false),
        }
    }

    /// Resolve `params` and navigate exactly once. Returns `None` without
    /// navigating if this instance already ran.
    pub async fn reconcile(
        &self,
        params: &CallbackParams,
        code_verifier: Option<&str>,
        navigator: &dyn Navigator,
    ) -> Option<Reconciled> {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("callback already reconciled by this path, ignoring");
            return None;
        }

        let next = sanitize_next(params.next.as_deref(), &self.settings.default_next);
        let (outcome, session) = self.resolve(params, code_verifier).await;
        let navigation = outcome.navigation(&next);

        info!(outcome = outcome.label(), %next, "auth callback reconciled");
        navigator.navigate(navigation.clone());

        Some(Reconciled {
            outcome,
            session,
            navigation,
        })
    }

    async fn resolve(
        &self,
        params: &CallbackParams,
        code_verifier: Option<&str>,
    ) -> (Outcome, Option<Session>) {
        if let Some(code) = params.provider_error() {
            warn!(error = code, "identity provider returned an error");
            return (
                Outcome::ProviderError {
                    code: code.to_string(),
                    description: params.error_description.clone().unwrap_or_default(),
                },
                None,
            );
        }

        let Some(code) = params.code() else {
            return (Outcome::NoCode, None);
        };

        match tokio::time::timeout(self.settings.timeout, self.exchange_once(code, code_verifier))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_secs = self.settings.timeout.as_secs(),
                    "code exchange timed out"
                );
                (Outcome::TimedOut, None)
            },
        }
    }

    async fn exchange_once(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> (Outcome, Option<Session>) {
        loop {
            match self.ledger.claim(code) {
                Claim::Owner(guard) => return self.exchange_owned(code, code_verifier, guard).await,
                Claim::Consumed => {
                    debug!("code already exchanged by another path");
                    return (Outcome::AlreadyConsumed, None);
                },
                Claim::Rejected(message) => return (Outcome::ExchangeFailed(message), None),
                Claim::InFlight(rx) => {
                    debug!("waiting for in-flight exchange on another path");
                    match ConsumedCodeLedger::wait(rx).await {
                        Settlement::Succeeded => return (Outcome::AlreadyConsumed, None),
                        Settlement::Rejected(message) => {
                            return (Outcome::ExchangeFailed(message), None);
                        },
                        Settlement::Pending | Settlement::Abandoned => continue,
                    }
                },
            }
        }
    }

    async fn exchange_owned(
        &self,
        code: &str,
        code_verifier: Option<&str>,
        guard: ClaimGuard,
    ) -> (Outcome, Option<Session>) {
        match self.exchanger.exchange(code, code_verifier).await {
            Ok(session) => {
                guard.settle(Settlement::Succeeded);
                (Outcome::Succeeded, Some(session))
            },
            Err(ExchangeError::Rejected { message, .. }) if is_already_consumed(&message) => {
                debug!(%message, "provider reports code already used, treating as success");
                guard.settle(Settlement::Succeeded);
                (Outcome::AlreadyConsumed, None)
            },
            Err(ExchangeError::Rejected { status, message }) => {
                warn!(status, %message, "provider rejected code exchange");
                guard.settle(Settlement::Rejected(message.clone()));
                (Outcome::ExchangeFailed(message), None)
            },
            Err(e) => {
                error!(error = %e, "code exchange failed unexpectedly");
                drop(guard);
                (Outcome::Unexpected(e.to_string()), None)
            },
        }
    }
}
