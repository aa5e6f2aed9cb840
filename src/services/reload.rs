use crate::error::Error;
use crate::services::assembler::{ConfigurationAssembler, Exclusion, RuntimeCameraConfig};
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub const DEFERRED_RELOAD_MESSAGE: &str =
    "Tracking engine not running, configurations will be loaded on next start";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub camera_count: usize,
}

/// The external tracking engine.
///
/// `reload` must swap the whole camera set atomically: the engine serves either
/// the previous complete set or the new one.
#[async_trait]
pub trait TrackingEngine: Send + Sync {
    async fn start(&self, configs: Vec<RuntimeCameraConfig>) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn reload(&self, configs: Vec<RuntimeCameraConfig>) -> Result<()>;
    async fn status(&self) -> Result<EngineStatus>;
}

type EngineSlot = Option<Arc<dyn TrackingEngine>>;

/// Shared slot holding the registered engine, if any.
///
/// Every operation on the engine goes through the same lock, so start, stop,
/// reload and registration never interleave.
#[derive(Clone, Default)]
pub struct EngineHandle {
    slot: Arc<Mutex<EngineSlot>>,
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, engine: Arc<dyn TrackingEngine>) {
        let mut slot = self.slot.lock().await;
        if slot.replace(engine).is_some() {
            warn!("Replacing previously registered tracking engine");
        } else {
            info!("Tracking engine registered");
        }
    }

    pub async fn unregister(&self) -> EngineSlot {
        let previous = self.slot.lock().await.take();
        if previous.is_some() {
            info!("Tracking engine unregistered");
        }
        previous
    }

    async fn lock(&self) -> MutexGuard<'_, EngineSlot> {
        self.slot.lock().await
    }
}

/// The registered engine, but only while it reports itself running
async fn running_engine(slot: &EngineSlot) -> Result<Option<&Arc<dyn TrackingEngine>>> {
    let Some(engine) = slot else {
        return Ok(None);
    };
    let running = engine.status().await?.running;
    Ok(running.then_some(engine))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReloadOutcome {
    Applied {
        applied: usize,
        excluded: Vec<Exclusion>,
    },
    Deferred {
        message: String,
    },
}

impl ReloadOutcome {
    pub fn message(&self) -> String {
        match self {
            ReloadOutcome::Applied { applied, excluded } if excluded.is_empty() => {
                format!("Reloaded {} camera configurations", applied)
            }
            ReloadOutcome::Applied { applied, excluded } => format!(
                "Reloaded {} camera configurations, {} excluded",
                applied,
                excluded.len()
            ),
            ReloadOutcome::Deferred { message } => message.clone(),
        }
    }
}

/// Result of a start/stop request. A request that finds the engine already in
/// the requested state is reported with `success = false`, not as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineCommandResult {
    pub success: bool,
    pub message: String,
    pub camera_count: usize,
}

/// Pushes assembled configuration into the registered tracking engine
pub struct ReloadCoordinator {
    assembler: Arc<ConfigurationAssembler>,
    engine: EngineHandle,
}

impl ReloadCoordinator {
    pub fn new(assembler: Arc<ConfigurationAssembler>, engine: EngineHandle) -> Self {
        Self { assembler, engine }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub async fn reload_camera_configurations(&self) -> Result<ReloadOutcome> {
        let slot = self.engine.lock().await;

        let Some(engine) = running_engine(&slot).await? else {
            info!("Reload requested with no running tracking engine");
            return Ok(ReloadOutcome::Deferred {
                message: DEFERRED_RELOAD_MESSAGE.to_string(),
            });
        };

        let report = self.assembler.load_validated_active().await?;
        let applied = report.configs.len();

        engine
            .reload(report.configs)
            .await
            .map_err(|e| Error::Engine(format!("Failed to reload configurations: {}", e)))?;

        info!("Pushed {} camera configurations to tracking engine", applied);
        Ok(ReloadOutcome::Applied {
            applied,
            excluded: report.exclusions,
        })
    }

    pub async fn start_engine(&self) -> Result<EngineCommandResult> {
        let slot = self.engine.lock().await;
        let engine = slot
            .as_ref()
            .ok_or_else(|| Error::Unavailable("No tracking engine is registered".to_string()))?;

        let status = engine.status().await?;
        if status.running {
            return Ok(EngineCommandResult {
                success: false,
                message: "Tracking engine is already running".to_string(),
                camera_count: status.camera_count,
            });
        }

        let report = self.assembler.load_validated_active().await?;
        let camera_count = report.configs.len();
        engine
            .start(report.configs)
            .await
            .map_err(|e| Error::Engine(format!("Failed to start tracking engine: {}", e)))?;

        info!("Tracking engine started with {} cameras", camera_count);
        Ok(EngineCommandResult {
            success: true,
            message: format!("Tracking engine started with {} cameras", camera_count),
            camera_count,
        })
    }

    pub async fn stop_engine(&self) -> Result<EngineCommandResult> {
        let slot = self.engine.lock().await;

        let Some(engine) = running_engine(&slot).await? else {
            return Ok(EngineCommandResult {
                success: false,
                message: "Tracking engine is not running".to_string(),
                camera_count: 0,
            });
        };

        engine
            .stop()
            .await
            .map_err(|e| Error::Engine(format!("Failed to stop tracking engine: {}", e)))?;

        info!("Tracking engine stopped");
        Ok(EngineCommandResult {
            success: true,
            message: "Tracking engine stopped".to_string(),
            camera_count: 0,
        })
    }

    /// Status of the registered engine; a missing engine reports as stopped
    pub async fn engine_status(&self) -> Result<EngineStatus> {
        let slot = self.engine.lock().await;
        match slot.as_ref() {
            Some(engine) => engine.status().await,
            None => Ok(EngineStatus::default()),
        }
    }

    pub async fn engine_running(&self) -> bool {
        match self.engine_status().await {
            Ok(status) => status.running,
            Err(e) => {
                warn!("Failed to query tracking engine status: {}", e);
                false
            }
        }
    }
}
