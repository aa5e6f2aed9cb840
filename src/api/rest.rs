use crate::config::{ApiConfig, Config};
use crate::db::repositories::CameraRepository;
use crate::device_manager::{DeviceScanner, DiscoveryService};
use crate::error::Error;
use crate::security::SecurityService;
use crate::services::{
    CameraManager, ConfigurationAssembler, DiscoveryIngestion, EngineHandle, ReloadCoordinator,
};
use anyhow::Result;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRef, FromRequest},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub mod camera_controller;
pub mod discovery_controller;
pub mod system_controller;
pub mod tripwire_controller;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub cameras: Arc<CameraManager>,
    pub assembler: Arc<ConfigurationAssembler>,
    pub coordinator: Arc<ReloadCoordinator>,
    pub discovery: Arc<DiscoveryService>,
    pub ingestion: Arc<DiscoveryIngestion>,
    pub security: Arc<SecurityService>,
}

impl AppState {
    /// Wire the services around one repository. Spawns the ingestion worker,
    /// so it must be called from within a tokio runtime.
    pub fn new(
        config: &Config,
        repository: Arc<dyn CameraRepository>,
        scanner: Arc<dyn DeviceScanner>,
        engine: EngineHandle,
    ) -> Self {
        let assembler = Arc::new(ConfigurationAssembler::new(repository.clone()));
        let coordinator = Arc::new(ReloadCoordinator::new(assembler.clone(), engine));

        Self {
            cameras: Arc::new(CameraManager::new(repository.clone(), coordinator.clone())),
            assembler,
            coordinator,
            discovery: Arc::new(DiscoveryService::new(scanner, config.discovery.clone())),
            ingestion: Arc::new(DiscoveryIngestion::start(repository, &config.ingestion)),
            security: Arc::new(SecurityService::new(config.security.clone())),
        }
    }
}

impl FromRef<AppState> for Arc<SecurityService> {
    fn from_ref(state: &AppState) -> Self {
        state.security.clone()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::Validation(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::Authorization(_) => StatusCode::FORBIDDEN,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Discovery(_) | Error::Database(_) | Error::Engine(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", err);
        }
        ApiError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        error!("Unhandled error: {:#}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// JSON body extractor whose rejections are reported as 400 `ApiError`s
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for ApiJson<T>
where
    T: DeserializeOwned,
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState) -> Self {
        Self {
            config: config.clone(),
            state,
        }
    }

    /// All routes with state applied
    pub fn router(state: AppState) -> Router {
        Router::new()
            .merge(discovery_controller::router())
            .merge(camera_controller::router())
            .merge(tripwire_controller::router())
            .merge(system_controller::router())
            .with_state(state)
    }

    pub async fn run(&self) -> Result<()> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(false)
            .max_age(Duration::from_secs(3600));

        let app = Self::router(self.state.clone()).layer(cors);

        let addr = format!("{}:{}", self.config.address, self.config.port);
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid API address {}: {}", addr, e)))?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }
}
