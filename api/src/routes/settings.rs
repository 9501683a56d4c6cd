//! Datasource settings endpoint.
//!
//! Builds a new datasource instance from the posted settings and swaps it in.
//! The previous instance is disposed once the new one is live; on failure the
//! previous instance stays in place.

use crate::routes::ErrorResponse;
use crate::state::AppState;
use axum::http::StatusCode;
use axum::{extract::State, routing::put, Json, Router};
use serde::{Deserialize, Serialize};
use shared::config::DatasourceSettings;
use shared::datasource::{Datasource, DatasourceError};

/// Instance settings as stored by the dashboard.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsRequest {
    /// Plain settings.
    pub json_data: serde_json::Value,
    /// Secret settings.
    pub secure_json_data: serde_json::Value,
}

/// Reply after a successful settings change.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    /// Always "applied".
    pub status: String,
    /// Authentication method of the new instance.
    pub auth_method: String,
}

/// Creates the settings routes with application state.
pub fn settings_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/settings", put(update_settings))
        .with_state(state)
}

async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<SettingsRequest>,
) -> Result<Json<SettingsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let settings =
        DatasourceSettings::from_instance_json(&request.json_data, &request.secure_json_data)
            .map_err(|e| reject(&DatasourceError::Config(e)))?;

    let datasource = Datasource::new(&settings).await.map_err(|e| reject(&e))?;
    state.replace(datasource).await;
    tracing::info!(auth_method = %settings.auth_method, "Datasource settings applied");

    Ok(Json(SettingsResponse {
        status: "applied".to_string(),
        auth_method: settings.auth_method.to_string(),
    }))
}

fn reject(error: &DatasourceError) -> (StatusCode, Json<ErrorResponse>) {
    tracing::warn!(error = %error, "Rejected datasource settings");
    match error {
        DatasourceError::Config(_) => {
            ErrorResponse::reply(StatusCode::BAD_REQUEST, "invalid_settings", error)
        }
        DatasourceError::Connect(_) => {
            ErrorResponse::reply(StatusCode::BAD_GATEWAY, "connection_failed", error)
        }
    }
}
