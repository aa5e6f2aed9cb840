use anyhow::Result;
use camfleet::api::rest::{AppState, RestApi};
use camfleet::config::{self, Config};
use camfleet::db::repositories::{CameraRepository, InMemoryCameraRepository, PgCameraRepository};
use camfleet::db::DatabaseService;
use camfleet::device_manager::OnvifScanner;
use camfleet::services::EngineHandle;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

const CONFIG_ENV: &str = "CAMFLEET_CONFIG";

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from)
}

async fn open_repository(config: &Config) -> Result<Arc<dyn CameraRepository>> {
    if config.database.is_memory() {
        warn!("Using in-memory camera store; records will not survive a restart");
        return Ok(Arc::new(InMemoryCameraRepository::new()));
    }

    let database = DatabaseService::new(&config.database).await?;
    if !database.health_check().await? {
        warn!("Database health check failed after connecting");
    }
    Ok(Arc::new(PgCameraRepository::new(database.pool.clone())))
}

async fn run_app(config: Config) -> Result<()> {
    info!("Starting camera fleet configuration service");

    let repository = open_repository(&config).await?;

    // The tracking engine registers itself through the handle when embedded
    let engine = EngineHandle::new();
    let state = AppState::new(&config, repository, Arc::new(OnvifScanner), engine);

    let http_server = RestApi::new(&config.api, state);

    tokio::select! {
        result = http_server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }

    Ok(())
}

fn main() {
    let config = match config::load_config(config_path().as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_app(config)) {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
