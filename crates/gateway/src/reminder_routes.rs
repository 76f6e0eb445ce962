use std::sync::Arc;

use {
    axum::{
        Json,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    axum_extra::extract::cookie::CookieJar,
    fittrack_reminders::{Notifier, Permission, ReminderConfig, StartResult},
    serde::Deserialize,
    serde_json::json,
    tracing::{error, info},
};

use crate::{auth_routes::require_session, state::GatewayState};

fn start_result_json(result: StartResult) -> serde_json::Value {
    match result {
        StartResult::Started => json!({ "active": true, "started": true }),
        StartResult::AlreadyRunning => json!({ "active": true, "started": false }),
        StartResult::PermissionNotGranted(permission) => json!({
            "active": false,
            "started": false,
            "permission": permission,
        }),
    }
}

/// `GET /api/reminders`
pub async fn get_config(State(state): State<Arc<GatewayState>>, jar: CookieJar) -> Response {
    if let Err(rejection) = require_session(&state, &jar) {
        return rejection;
    }
    match state.scheduler.store().load().await {
        Ok(config) => Json(json!({
            "config": config,
            "active": state.scheduler.is_active(),
            "permission": state.notifier.permission(),
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "failed to load reminder config");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        },
    }
}

/// `PUT /api/reminders`
pub async fn put_config(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    Json(config): Json<ReminderConfig>,
) -> Response {
    if let Err(rejection) = require_session(&state, &jar) {
        return rejection;
    }
    if let Err(e) = state.scheduler.store().save(&config).await {
        error!(error = %e, "failed to save reminder config");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    info!(enabled = config.enabled, kinds = config.kinds.len(), "reminder config updated");

    if !config.enabled {
        state.scheduler.stop();
    }
    Json(json!({ "config": config, "active": state.scheduler.is_active() })).into_response()
}

/// `POST /api/reminders/start`
pub async fn start(State(state): State<Arc<GatewayState>>, jar: CookieJar) -> Response {
    if let Err(rejection) = require_session(&state, &jar) {
        return rejection;
    }
    Json(start_result_json(state.scheduler.start().await)).into_response()
}

/// `POST /api/reminders/stop`
pub async fn stop(State(state): State<Arc<GatewayState>>, jar: CookieJar) -> Response {
    if let Err(rejection) = require_session(&state, &jar) {
        return rejection;
    }
    let was_active = state.scheduler.stop();
    Json(json!({ "active": false, "stopped": was_active })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PermissionBody {
    pub permission: Permission,
}

/// `POST /api/notifications/permission`: the browser reports its answer.
pub async fn set_permission(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    Json(body): Json<PermissionBody>,
) -> Response {
    if let Err(rejection) = require_session(&state, &jar) {
        return rejection;
    }
    state.notifier.set_permission(body.permission);
    info!(permission = ?body.permission, "notification permission updated");

    match body.permission {
        Permission::Granted if state.config.reminders.autostart => {
            if let Some(result) = state.start_reminders_if_enabled().await {
                return Json(start_result_json(result)).into_response();
            }
        },
        Permission::Denied => {
            state.scheduler.stop();
        },
        _ => {},
    }
    Json(json!({ "active": state.scheduler.is_active(), "permission": body.permission }))
        .into_response()
}
