use crate::api::rest::{ApiError, ApiJson, ApiResult, AppState, MessageResponse};
use crate::db::models::{
    CameraId, CameraRecord, CameraUpdate, CameraWithTripwires, ConfigureCamera, NewCamera,
};
use crate::security::auth::{RequireAdmin, RequireSuperAdmin};
use crate::services::assembler::AssemblyReport;
use crate::services::camera_manager::{CameraList, CameraListQuery, CameraStatusSnapshot};
use crate::services::reload::ReloadOutcome;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ActivationRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct StreamUrlResponse {
    pub camera_id: CameraId,
    pub stream_url: String,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub message: String,
    pub details: ReloadOutcome,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cameras", get(list_cameras).post(create_camera))
        .route("/cameras/runtime", get(runtime_configuration))
        .route("/cameras/reload-configurations", post(reload_configurations))
        .route(
            "/cameras/:id",
            get(get_camera).put(update_camera).delete(delete_camera),
        )
        .route("/cameras/:id/configure", post(configure_camera))
        .route("/cameras/:id/activate", post(activate_camera))
        .route("/cameras/:id/status", get(camera_status))
        .route("/cameras/:id/stream-url", get(stream_url))
}

async fn list_cameras(
    _: RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<CameraListQuery>,
) -> ApiResult<Json<CameraList>> {
    Ok(Json(state.cameras.list_cameras(&query).await?))
}

async fn get_camera(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
) -> ApiResult<Json<CameraWithTripwires>> {
    Ok(Json(state.cameras.get_camera(id).await?))
}

async fn create_camera(
    _: RequireSuperAdmin,
    State(state): State<AppState>,
    ApiJson(camera): ApiJson<NewCamera>,
) -> ApiResult<(StatusCode, Json<CameraRecord>)> {
    let created = state.cameras.create_camera(camera).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_camera(
    _: RequireSuperAdmin,
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
    ApiJson(update): ApiJson<CameraUpdate>,
) -> ApiResult<Json<CameraRecord>> {
    Ok(Json(state.cameras.update_camera(id, &update).await?))
}

async fn configure_camera(
    RequireSuperAdmin(user): RequireSuperAdmin,
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
    ApiJson(request): ApiJson<ConfigureCamera>,
) -> ApiResult<Json<CameraWithTripwires>> {
    info!("Camera {} configured by {}", id, user.name);
    Ok(Json(state.cameras.configure_camera(id, &request).await?))
}

async fn activate_camera(
    _: RequireSuperAdmin,
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
    ApiJson(request): ApiJson<ActivationRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.cameras.activate_camera(id, request.is_active).await?;

    let action = if request.is_active {
        "activated"
    } else {
        "deactivated"
    };
    Ok(Json(MessageResponse::ok(format!(
        "Camera {} {} successfully",
        id, action
    ))))
}

async fn delete_camera(
    _: RequireSuperAdmin,
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
) -> ApiResult<Json<MessageResponse>> {
    state.cameras.delete_camera(id).await?;
    Ok(Json(MessageResponse::ok(format!(
        "Camera {} deleted successfully",
        id
    ))))
}

async fn camera_status(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
) -> ApiResult<Json<CameraStatusSnapshot>> {
    Ok(Json(state.cameras.camera_status(id).await?))
}

async fn stream_url(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
) -> ApiResult<Json<StreamUrlResponse>> {
    let stream_url = state
        .assembler
        .get_camera_stream_url(id)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                format!("No stream URL available for camera {}", id),
            )
        })?;

    Ok(Json(StreamUrlResponse {
        camera_id: id,
        stream_url,
    }))
}

async fn runtime_configuration(
    _: RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<Json<AssemblyReport>> {
    Ok(Json(state.assembler.load_validated_active().await?))
}

async fn reload_configurations(
    RequireSuperAdmin(user): RequireSuperAdmin,
    State(state): State<AppState>,
) -> ApiResult<Json<ReloadResponse>> {
    info!("Configuration reload requested by {}", user.name);
    let outcome = state.coordinator.reload_camera_configurations().await?;

    Ok(Json(ReloadResponse {
        success: true,
        message: outcome.message(),
        details: outcome,
    }))
}
