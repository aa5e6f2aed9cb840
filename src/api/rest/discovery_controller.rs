use crate::api::rest::{ApiError, ApiJson, ApiResult, AppState};
use crate::device_manager::discovery::{DiscoveredDevice, DiscoveryRequest};
use crate::security::auth::{RequireAdmin, RequireSuperAdmin};
use crate::services::ingestion::IngestionJobState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub discovered_cameras: Vec<DiscoveredDevice>,
    pub total_discovered: usize,
    /// Seconds
    pub discovery_time: f64,
    pub network_range: Option<String>,
    /// Background persistence job, absent when nothing was queued
    pub ingestion_job: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cameras/discover", post(discover_cameras))
        .route("/cameras/discover/jobs/:id", get(ingestion_job))
}

async fn discover_cameras(
    RequireSuperAdmin(user): RequireSuperAdmin,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DiscoveryRequest>,
) -> ApiResult<Json<DiscoveryResponse>> {
    info!(
        "Camera discovery started by {} (range: {})",
        user.name,
        request.network_range.as_deref().unwrap_or("any")
    );

    let result = state.discovery.discover(&request).await?;

    let ingestion_job = if result.devices.is_empty() {
        None
    } else {
        match state.ingestion.submit(result.devices.clone()).await {
            Ok(ticket) => Some(ticket.job_id),
            Err(e) => {
                warn!("Discovered cameras were not queued for storage: {}", e);
                None
            }
        }
    };

    Ok(Json(DiscoveryResponse {
        total_discovered: result.devices.len(),
        discovered_cameras: result.devices,
        discovery_time: result.elapsed.as_secs_f64(),
        network_range: result.network_range.map(|range| range.to_string()),
        ingestion_job,
    }))
}

async fn ingestion_job(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<IngestionJobState>> {
    state
        .ingestion
        .job_state(job_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                format!("Ingestion job {} not found", job_id),
            )
        })
}
