use crate::api::rest::{ApiResult, AppState};
use crate::security::auth::RequireAdmin;
use crate::services::reload::{EngineCommandResult, EngineStatus};
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use log::info;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/system/start", post(start_engine))
        .route("/system/stop", post(stop_engine))
        .route("/system/status", get(engine_status))
}

async fn start_engine(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<Json<EngineCommandResult>> {
    info!("Tracking engine start requested by {} ({})", user.name, user.subject);
    Ok(Json(state.coordinator.start_engine().await?))
}

async fn stop_engine(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<Json<EngineCommandResult>> {
    info!("Tracking engine stop requested by {} ({})", user.name, user.subject);
    Ok(Json(state.coordinator.stop_engine().await?))
}

async fn engine_status(
    _: RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<Json<EngineStatus>> {
    Ok(Json(state.coordinator.engine_status().await?))
}
