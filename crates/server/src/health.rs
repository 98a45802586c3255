use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use miled_agent::ConfigStore;
use serde::Serialize;

use crate::api::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub config: HealthCheck,
    pub checked_at: String,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let config = config_check(state.runtime.store()).await;
    let ready = config.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "miled-server runtime initialized".to_string(),
        },
        config,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn config_check(store: &ConfigStore) -> HealthCheck {
    match store.load().await {
        Ok(root) => HealthCheck {
            status: "ready",
            detail: format!("config document loaded ({} agents)", root.candidates().len()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("config document unavailable: {error}") }
        }
    }
}
