pub mod exchange;
pub mod flow;
pub mod ledger;
pub mod navigation;
pub mod pkce;
pub mod reconcile;
pub mod types;

pub use {
    exchange::{ExchangeError, SessionExchanger, SupabaseExchanger},
    flow::{AuthorizeRequest, OAuthFlow},
    ledger::{ConsumedCodeLedger, Settlement},
    navigation::{Navigation, Navigator, RecordingNavigator, sanitize_next},
    reconcile::{CallbackReconciler, Outcome, ReconcileSettings, Reconciled},
    types::{CallbackParams, PkceChallenge, Session},
};
