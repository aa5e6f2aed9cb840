use crate::api::rest::{ApiJson, ApiResult, AppState, MessageResponse};
use crate::db::models::{CameraId, NewTripwire, TripwireId, TripwireRecord, TripwireUpdate};
use crate::security::auth::{RequireAdmin, RequireSuperAdmin};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, put};
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/cameras/:id/tripwires",
            get(list_tripwires).post(create_tripwire),
        )
        .route("/tripwires/:id", put(update_tripwire).delete(delete_tripwire))
}

async fn create_tripwire(
    _: RequireSuperAdmin,
    State(state): State<AppState>,
    Path(camera_id): Path<CameraId>,
    ApiJson(tripwire): ApiJson<NewTripwire>,
) -> ApiResult<(StatusCode, Json<TripwireRecord>)> {
    let created = state.cameras.create_tripwire(camera_id, &tripwire).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_tripwires(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> ApiResult<Json<Vec<TripwireRecord>>> {
    Ok(Json(state.cameras.list_tripwires(camera_id).await?))
}

async fn update_tripwire(
    _: RequireSuperAdmin,
    State(state): State<AppState>,
    Path(tripwire_id): Path<TripwireId>,
    ApiJson(update): ApiJson<TripwireUpdate>,
) -> ApiResult<Json<TripwireRecord>> {
    Ok(Json(state.cameras.update_tripwire(tripwire_id, &update).await?))
}

async fn delete_tripwire(
    _: RequireSuperAdmin,
    State(state): State<AppState>,
    Path(tripwire_id): Path<TripwireId>,
) -> ApiResult<Json<MessageResponse>> {
    state.cameras.delete_tripwire(tripwire_id).await?;
    Ok(Json(MessageResponse::ok(format!(
        "Tripwire {} deleted successfully",
        tripwire_id
    ))))
}
