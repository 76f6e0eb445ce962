use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Router,
        http::{HeaderValue, Method, header},
        routing::{get, post},
    },
    fittrack_config::{FitTrackConfig, data_dir},
    fittrack_oauth::SupabaseExchanger,
    fittrack_reminders::FileReminderStore,
    tower_http::{
        cors::{AllowOrigin, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{auth_routes, notifications, reminder_routes, state::GatewayState};

/// Cross-origin access is limited to the origin of `server.public_url`, with
/// cookies allowed.
fn cors_layer(config: &FitTrackConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = url::Url::parse(&config.server.public_url)
        .ok()
        .map(|u| u.origin().ascii_serialization())
        .filter(|origin| origin != "null")
        .and_then(|origin| HeaderValue::from_str(&origin).ok())
        .into_iter()
        .collect();
    if origins.is_empty() {
        warn!(
            public_url = %config.server.public_url,
            "server.public_url has no usable origin, cross-origin requests are refused"
        );
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the router over `state`.
pub fn build_app(state: Arc<GatewayState>) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/auth/login", get(auth_routes::login))
        .route("/auth/callback", get(auth_routes::callback))
        .route("/auth/error", get(auth_routes::error_page))
        .route("/api/auth/exchange", post(auth_routes::exchange))
        .route("/api/auth/logout", post(auth_routes::logout))
        .route("/api/auth/session", get(auth_routes::session))
        .route(
            "/api/reminders",
            get(reminder_routes::get_config).put(reminder_routes::put_config),
        )
        .route("/api/reminders/start", post(reminder_routes::start))
        .route("/api/reminders/stop", post(reminder_routes::stop))
        .route(
            "/api/notifications/permission",
            post(reminder_routes::set_permission),
        )
        .route("/api/notifications/stream", get(notifications::stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Where reminder settings live when the config does not say.
pub fn reminder_store_path(config: &FitTrackConfig) -> anyhow::Result<PathBuf> {
    match &config.reminders.store_path {
        Some(path) => Ok(path.clone()),
        None => data_dir()
            .map(|d| d.join("reminders.json"))
            .context("could not determine data directory"),
    }
}

/// Run the gateway until Ctrl-C.
pub async fn start_gateway(config: FitTrackConfig) -> anyhow::Result<()> {
    if config.auth.supabase_url.is_empty() {
        warn!("auth.supabase_url is not set, logins will fail");
    }

    let exchanger = Arc::new(SupabaseExchanger::new(
        &config.auth.supabase_url,
        config.auth.anon_key.clone(),
    ));
    let store = Arc::new(FileReminderStore::new(reminder_store_path(&config)?));
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let autostart = config.reminders.autostart;

    let state = GatewayState::new(config, exchanger, store);
    if autostart && let Some(result) = state.start_reminders_if_enabled().await {
        info!(?result, "reminder autostart");
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "fittrack gateway listening");

    axum::serve(listener, build_app(Arc::clone(&state)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    state.scheduler.stop();
    Ok(())
}
