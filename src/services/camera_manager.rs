use crate::db::models::{
    CameraId, CameraRecord, CameraStatus, CameraUpdate, CameraWithTripwires, ConfigureCamera,
    NewCamera, NewTripwire, TripwireId, TripwireRecord, TripwireUpdate,
};
use crate::db::repositories::CameraRepository;
use crate::error::Error;
use crate::services::reload::ReloadCoordinator;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CameraListQuery {
    pub status: Option<CameraStatus>,
    /// Takes precedence over `status`
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraList {
    pub cameras: Vec<CameraRecord>,
    pub total_count: usize,
    pub active_count: usize,
    pub inactive_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamHealth {
    Healthy,
    Offline,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraStatusSnapshot {
    pub camera_id: CameraId,
    pub camera_name: String,
    pub status: CameraStatus,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
    pub stream_health: StreamHealth,
    pub engine_running: bool,
}

fn not_found(camera_id: CameraId) -> Error {
    Error::NotFound(format!("Camera {} not found", camera_id))
}

fn tripwire_not_found(tripwire_id: TripwireId) -> Error {
    Error::NotFound(format!("Tripwire {} not found", tripwire_id))
}

/// Stored record with `status` replaced by its effective value
fn presented(mut camera: CameraRecord) -> CameraRecord {
    camera.status = camera.effective_status();
    camera
}

fn check_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::Validation("camera_name must not be empty".to_string()));
    }
    Ok(())
}

/// Administrative operations on cameras and their tripwires.
///
/// Unlike the batch assembly path, every operation here targets a single
/// record and fails with `NotFound` when it is absent.
pub struct CameraManager {
    repository: Arc<dyn CameraRepository>,
    coordinator: Arc<ReloadCoordinator>,
}

impl CameraManager {
    pub fn new(repository: Arc<dyn CameraRepository>, coordinator: Arc<ReloadCoordinator>) -> Self {
        Self {
            repository,
            coordinator,
        }
    }

    async fn require_camera(&self, camera_id: CameraId) -> Result<CameraRecord> {
        self.repository
            .get_camera(camera_id)
            .await?
            .ok_or_else(|| not_found(camera_id).into())
    }

    async fn with_tripwires(&self, camera: CameraRecord) -> Result<CameraWithTripwires> {
        let tripwires = self.repository.get_camera_tripwires(camera.camera_id).await?;
        Ok(CameraWithTripwires {
            camera: presented(camera),
            tripwires,
        })
    }

    pub async fn create_camera(&self, camera: NewCamera) -> Result<CameraRecord> {
        check_name(&camera.camera_name)?;
        if let Some(camera_id) = camera.camera_id {
            if camera_id <= 0 {
                return Err(Error::Validation("camera_id must be positive".to_string()).into());
            }
        }

        let created = self.repository.create_camera(camera).await?;
        info!("Created camera {} ({})", created.camera_id, created.camera_name);
        Ok(presented(created))
    }

    pub async fn get_camera(&self, camera_id: CameraId) -> Result<CameraWithTripwires> {
        let camera = self.require_camera(camera_id).await?;
        self.with_tripwires(camera).await
    }

    pub async fn list_cameras(&self, query: &CameraListQuery) -> Result<CameraList> {
        let cameras = if query.active_only {
            self.repository.list_active_cameras().await?
        } else if let Some(status) = query.status {
            self.repository.list_cameras_by_status(status).await?
        } else {
            self.repository.list_cameras().await?
        };

        let total_count = cameras.len();
        let active_count = cameras.iter().filter(|c| c.is_active).count();

        Ok(CameraList {
            cameras: cameras.into_iter().map(presented).collect(),
            total_count,
            active_count,
            inactive_count: total_count - active_count,
        })
    }

    pub async fn update_camera(&self, camera_id: CameraId, update: &CameraUpdate) -> Result<CameraRecord> {
        if let Some(name) = &update.camera_name {
            check_name(name)?;
        }

        let updated = self
            .repository
            .update_camera(camera_id, update)
            .await?
            .ok_or_else(|| not_found(camera_id))?;
        Ok(presented(updated))
    }

    /// Apply camera settings, move it to `configured` and add the given tripwires.
    /// Returns the camera with all of its tripwires, including earlier ones.
    pub async fn configure_camera(
        &self,
        camera_id: CameraId,
        request: &ConfigureCamera,
    ) -> Result<CameraWithTripwires> {
        check_name(&request.camera_name)?;
        for tripwire in &request.tripwires {
            tripwire.validate()?;
        }

        let camera = self
            .repository
            .update_camera(camera_id, &request.camera_update())
            .await?
            .ok_or_else(|| not_found(camera_id))?;

        for tripwire in &request.tripwires {
            self.repository
                .create_tripwire(camera_id, tripwire)
                .await?
                .ok_or_else(|| not_found(camera_id))?;
        }

        info!(
            "Configured camera {} with {} new tripwires",
            camera_id,
            request.tripwires.len()
        );
        self.with_tripwires(camera).await
    }

    pub async fn activate_camera(&self, camera_id: CameraId, is_active: bool) -> Result<()> {
        if !self.repository.set_active(camera_id, is_active).await? {
            return Err(not_found(camera_id).into());
        }

        info!(
            "Camera {} {}",
            camera_id,
            if is_active { "activated" } else { "deactivated" }
        );
        Ok(())
    }

    pub async fn delete_camera(&self, camera_id: CameraId) -> Result<()> {
        if !self.repository.delete_camera(camera_id).await? {
            return Err(not_found(camera_id).into());
        }
        info!("Deleted camera {}", camera_id);
        Ok(())
    }

    pub async fn camera_status(&self, camera_id: CameraId) -> Result<CameraStatusSnapshot> {
        let camera = self.require_camera(camera_id).await?;
        let engine_running = self.coordinator.engine_running().await;

        Ok(CameraStatusSnapshot {
            camera_id: camera.camera_id,
            status: camera.effective_status(),
            is_active: camera.is_active,
            last_seen: camera.updated_at,
            stream_health: if camera.is_active {
                StreamHealth::Healthy
            } else {
                StreamHealth::Offline
            },
            engine_running,
            camera_name: camera.camera_name,
        })
    }

    pub async fn create_tripwire(&self, camera_id: CameraId, tripwire: &NewTripwire) -> Result<TripwireRecord> {
        tripwire.validate()?;

        let created = self
            .repository
            .create_tripwire(camera_id, tripwire)
            .await?
            .ok_or_else(|| not_found(camera_id))?;
        info!("Created tripwire {} on camera {}", created.id, camera_id);
        Ok(created)
    }

    pub async fn list_tripwires(&self, camera_id: CameraId) -> Result<Vec<TripwireRecord>> {
        self.require_camera(camera_id).await?;
        self.repository.get_camera_tripwires(camera_id).await
    }

    pub async fn update_tripwire(&self, tripwire_id: TripwireId, update: &TripwireUpdate) -> Result<TripwireRecord> {
        update.validate()?;

        self.repository
            .update_tripwire(tripwire_id, update)
            .await?
            .ok_or_else(|| tripwire_not_found(tripwire_id).into())
    }

    pub async fn delete_tripwire(&self, tripwire_id: TripwireId) -> Result<()> {
        if !self.repository.delete_tripwire(tripwire_id).await? {
            warn!("Delete requested for unknown tripwire {}", tripwire_id);
            return Err(tripwire_not_found(tripwire_id).into());
        }
        Ok(())
    }
}
