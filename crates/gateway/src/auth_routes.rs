//! Login start, both callback entry points, logout and the error page.

use std::sync::Arc;

use {
    axum::{
        Json,
        extract::{Query, State},
        http::StatusCode,
        response::{Html, IntoResponse, Redirect, Response},
    },
    axum_extra::extract::cookie::{Cookie, CookieJar, SameSite},
    fittrack_oauth::{CallbackParams, Navigation, RecordingNavigator, Session, sanitize_next},
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use crate::state::GatewayState;

pub const SESSION_COOKIE: &str = "fittrack_session";
pub const VERIFIER_COOKIE: &str = "fittrack_code_verifier";

fn cookie(state: &GatewayState, name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.server.public_url.starts_with("https://"))
        .build()
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

/// The live session behind the request's cookie, or a 401 response.
pub fn require_session(state: &GatewayState, jar: &CookieJar) -> Result<Session, Response> {
    jar.get(SESSION_COOKIE)
        .and_then(|c| state.sessions.get(c.value()))
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "sign in required").into_response())
}

// ── Login start ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub provider: String,
    pub next: Option<String>,
}

/// `GET /auth/login?provider=google&next=/home`
pub async fn login(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    let next = sanitize_next(query.next.as_deref(), &state.config.auth.default_next);
    match state.flow.start(&query.provider, &next) {
        Ok(req) => {
            info!(provider = %query.provider, "starting social login");
            let jar = jar.add(cookie(&state, VERIFIER_COOKIE, req.pkce.verifier));
            (jar, Redirect::to(&req.url)).into_response()
        },
        Err(e) => {
            warn!(provider = %query.provider, error = %e, "cannot start login");
            let nav = Navigation::error("login_unavailable", "This sign-in method is unavailable");
            Redirect::to(&nav.to_url(state.error_page())).into_response()
        },
    }
}

// ── Callback entry points ────────────────────────────────────────────────────

/// Run the shared reconciler and turn its result into cookies plus a target URL.
async fn complete_callback(
    state: &GatewayState,
    jar: CookieJar,
    params: &CallbackParams,
    code_verifier: Option<&str>,
) -> (CookieJar, String, &'static str) {
    let navigator = RecordingNavigator::new();
    let reconciled = state
        .reconciler()
        .reconcile(params, code_verifier, &navigator)
        .await;

    let mut jar = jar.remove(removal(VERIFIER_COOKIE));
    let label = reconciled
        .as_ref()
        .map_or("ignored", |r| r.outcome.label());

    if let Some(session) = reconciled.and_then(|r| r.session) {
        let id = state.sessions.insert(session);
        jar = jar.add(cookie(state, SESSION_COOKIE, id));
        if let Some(result) = state.start_reminders_if_enabled().await {
            info!(?result, "reminder loop on session start");
        }
    }

    let target = navigator
        .last()
        .unwrap_or_else(|| Navigation::Destination(state.config.auth.default_next.clone()));
    (jar, target.to_url(state.error_page()), label)
}

/// `GET /auth/callback`: the provider redirects the browser here.
pub async fn callback(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let verifier = jar.get(VERIFIER_COOKIE).map(|c| c.value().to_string());
    let (jar, url, _) = complete_callback(&state, jar, &params, verifier.as_deref()).await;
    (jar, Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    #[serde(flatten)]
    pub params: CallbackParams,
    pub code_verifier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub redirect: String,
    pub outcome: &'static str,
}

/// `POST /api/auth/exchange`: the client page forwards the callback query.
pub async fn exchange(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    Json(body): Json<ExchangeRequest>,
) -> impl IntoResponse {
    let verifier = body
        .code_verifier
        .or_else(|| jar.get(VERIFIER_COOKIE).map(|c| c.value().to_string()));
    let (jar, redirect, outcome) =
        complete_callback(&state, jar, &body.params, verifier.as_deref()).await;
    (jar, Json(ExchangeResponse { redirect, outcome }))
}

/// `POST /api/auth/logout`
pub async fn logout(State(state): State<Arc<GatewayState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(c) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(c.value());
    }
    state.sessions.purge_expired();
    if state.sessions.is_empty() {
        state.scheduler.stop();
    }
    (jar.remove(removal(SESSION_COOKIE)), StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub expires_at: Option<u64>,
}

/// `GET /api/auth/session`
pub async fn session(State(state): State<Arc<GatewayState>>, jar: CookieJar) -> Response {
    match require_session(&state, &jar) {
        Ok(s) => Json(SessionInfo {
            user_id: s.user_id,
            email: s.email,
            expires_at: s.expires_at,
        })
        .into_response(),
        Err(rejection) => rejection,
    }
}

// ── Error page ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ErrorQuery {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `GET /auth/error`
pub async fn error_page(Query(query): Query<ErrorQuery>) -> Html<String> {
    let code = query.error.unwrap_or_else(|| "unknown_error".into());
    let description = query
        .error_description
        .unwrap_or_else(|| "Sign-in failed.".into());
    Html(format!(
        "<!doctype html><html><head><title>Sign-in failed</title></head><body>\
         <h1>Sign-in failed</h1><p>{}</p><p><code>{}</code></p>\
         <p><a href=\"/login\">Back to login</a></p></body></html>",
        html_escape::encode_text(&description),
        html_escape::encode_text(&code),
    ))
}
