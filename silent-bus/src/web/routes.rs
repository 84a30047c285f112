//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::dto::*;
use super::error::AppError;
use super::state::AppState;
use crate::registry::EntryStatus;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/entries", get(list_entries))
        .route("/api/entries/:id/sensors", get(entry_sensors))
        .route("/api/entries/:id/refresh", post(refresh_entry))
        .route("/api/entries/:id/reload", post(reload_entry))
        .route("/api/entries/:id/lines", put(update_lines))
        .route("/api/stations/search", get(search_stations))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Running entries with availability and current period.
async fn list_entries(State(state): State<AppState>) -> Json<EntryListResponse> {
    Json(EntryListResponse {
        entries: state.registry.entries(),
    })
}

/// Rendered sensors of one entry.
async fn entry_sensors(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SensorListResponse>, AppError> {
    let sensors = state.registry.readings(&id)?;
    Ok(Json(SensorListResponse { entry: id, sensors }))
}

/// Refresh an entry now.
async fn refresh_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>, AppError> {
    let outcome = state.registry.refresh(&id).await?;
    info!(entry = %id, ?outcome, "Manual refresh");
    Ok(Json(outcome.into()))
}

/// Re-read an entry from the config file and swap in a new coordinator.
async fn reload_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntryStatus>, AppError> {
    state.registry.reload_entry(&id).await?;
    info!(entry = %id, "Reloaded entry");

    state
        .registry
        .status(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            message: format!("unknown entry '{id}'"),
        })
}

/// Replace the line filters of a stop entry.
///
/// Persisting writes the config file, so it runs on the blocking pool.
async fn update_lines(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLinesRequest>,
) -> Result<Json<SensorListResponse>, AppError> {
    let registry = Arc::clone(&state.registry);
    let (entry, lines) = (id.clone(), req.lines.clone());
    let sensors = tokio::task::spawn_blocking(move || registry.update_lines(&entry, &lines))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("line update task failed: {e}"),
        })??;

    info!(entry = %id, lines = %req.lines, "Updated line filters");
    Ok(Json(SensorListResponse { entry: id, sensors }))
}

/// Search stations by name or code.
async fn search_stations(
    State(state): State<AppState>,
    Query(req): Query<StationSearchRequest>,
) -> Result<Json<StationSearchResponse>, AppError> {
    let query = req.q.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest {
            message: "query must not be empty".to_string(),
        });
    }

    let locale = req.locale.unwrap_or_else(|| state.default_locale());
    let stations = state.stations.search(query, &locale).await?;

    Ok(Json(StationSearchResponse {
        stations: stations.as_ref().clone(),
    }))
}
