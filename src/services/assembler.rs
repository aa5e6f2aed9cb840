use crate::db::models::{CameraId, CameraRecord, CameraType, TripwireId, TripwireRecord};
use crate::db::repositories::CameraRepository;
use crate::services::validator::{ConfigurationValidator, ValidationFailure};
use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_RTSP_PORT: u16 = 554;
pub const DEFAULT_STREAM_PATH: &str = "/stream1";

/// Stream URL used when a camera has none stored
pub fn default_stream_url(ip_address: &str) -> String {
    format!("rtsp://{}:{}{}", ip_address, DEFAULT_RTSP_PORT, DEFAULT_STREAM_PATH)
}

/// Engine-facing tripwire, copied from an active tripwire record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeTripwireConfig {
    pub position: f64,
    pub spacing: f64,
    pub direction: String,
    pub name: String,
    pub detection_type: String,
    pub is_active: bool,
}

/// Engine-facing camera configuration. Derived on every assembly, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeCameraConfig {
    pub camera_id: CameraId,
    pub gpu_id: i32,
    pub camera_type: CameraType,
    pub camera_name: String,
    pub ip_address: Option<String>,
    pub stream_url: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Evaluated by the engine in this order
    pub tripwires: Vec<RuntimeTripwireConfig>,
    pub resolution: (i32, i32),
    pub fps: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingIpAddress,
    InvalidTripwire {
        tripwire_id: TripwireId,
        detail: String,
    },
    StoreFailure {
        detail: String,
    },
    ValidationFailed {
        failure: ValidationFailure,
    },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::MissingIpAddress => write!(f, "no ip_address"),
            ExclusionReason::InvalidTripwire {
                tripwire_id,
                detail,
            } => write!(f, "invalid tripwire {}: {}", tripwire_id, detail),
            ExclusionReason::StoreFailure { detail } => {
                write!(f, "failed to load tripwires: {}", detail)
            }
            ExclusionReason::ValidationFailed { failure } => {
                write!(f, "validation failed: {}", failure)
            }
        }
    }
}

/// A camera left out of a runtime set, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub camera_id: CameraId,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub configs: Vec<RuntimeCameraConfig>,
    pub exclusions: Vec<Exclusion>,
}

impl AssemblyReport {
    fn exclude(&mut self, camera_id: CameraId, reason: ExclusionReason) {
        warn!("Excluding camera {} from runtime set: {}", camera_id, reason);
        self.exclusions.push(Exclusion { camera_id, reason });
    }
}

fn convert_tripwire(tripwire: &TripwireRecord) -> Result<RuntimeTripwireConfig, ExclusionReason> {
    if !tripwire.position.is_finite() {
        return Err(ExclusionReason::InvalidTripwire {
            tripwire_id: tripwire.id,
            detail: format!("position {} is not a number", tripwire.position),
        });
    }
    if !tripwire.spacing.is_finite() || tripwire.spacing < 0.0 {
        return Err(ExclusionReason::InvalidTripwire {
            tripwire_id: tripwire.id,
            detail: format!("spacing {} is not a non-negative number", tripwire.spacing),
        });
    }

    Ok(RuntimeTripwireConfig {
        position: tripwire.position,
        spacing: tripwire.spacing,
        direction: tripwire.direction.clone(),
        name: tripwire.name.clone(),
        detection_type: tripwire.detection_type.clone(),
        is_active: tripwire.is_active,
    })
}

/// Builds runtime configuration from persisted camera and tripwire records.
///
/// Batch loads never fail because of a single camera: a camera that cannot be
/// converted is recorded as an [`Exclusion`] and the rest of the batch proceeds.
pub struct ConfigurationAssembler {
    repository: Arc<dyn CameraRepository>,
    validator: ConfigurationValidator,
}

impl ConfigurationAssembler {
    pub fn new(repository: Arc<dyn CameraRepository>) -> Self {
        Self {
            repository,
            validator: ConfigurationValidator::new(),
        }
    }

    async fn convert(&self, camera: &CameraRecord) -> Result<RuntimeCameraConfig, ExclusionReason> {
        let ip_address = match camera.ip_address.as_deref() {
            Some(ip) if !ip.is_empty() => ip,
            _ => return Err(ExclusionReason::MissingIpAddress),
        };

        let tripwires = self
            .repository
            .get_camera_tripwires(camera.camera_id)
            .await
            .map_err(|e| ExclusionReason::StoreFailure {
                detail: e.to_string(),
            })?
            .iter()
            .filter(|t| t.is_active)
            .map(convert_tripwire)
            .collect::<Result<Vec<_>, _>>()?;

        let stream_url = match camera.stream_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => default_stream_url(ip_address),
        };

        Ok(RuntimeCameraConfig {
            camera_id: camera.camera_id,
            gpu_id: camera.gpu_id,
            camera_type: camera.camera_type,
            camera_name: camera.camera_name.clone(),
            ip_address: Some(ip_address.to_string()),
            stream_url: Some(stream_url),
            username: camera.username.clone(),
            password: camera.password.clone(),
            tripwires,
            resolution: (camera.resolution_width, camera.resolution_height),
            fps: camera.fps,
            is_active: camera.is_active,
        })
    }

    async fn assemble(&self, cameras: Vec<CameraRecord>) -> AssemblyReport {
        let mut report = AssemblyReport::default();

        for camera in &cameras {
            match self.convert(camera).await {
                Ok(config) => report.configs.push(config),
                Err(reason) => report.exclude(camera.camera_id, reason),
            }
        }

        debug!(
            "Assembled {} camera configurations ({} excluded)",
            report.configs.len(),
            report.exclusions.len()
        );
        report
    }

    pub async fn assemble_active(&self) -> Result<AssemblyReport> {
        let cameras = self.repository.list_active_cameras().await?;
        Ok(self.assemble(cameras).await)
    }

    pub async fn assemble_all(&self) -> Result<AssemblyReport> {
        let cameras = self.repository.list_cameras().await?;
        Ok(self.assemble(cameras).await)
    }

    pub async fn load_active_cameras(&self) -> Result<Vec<RuntimeCameraConfig>> {
        let report = self.assemble_active().await?;
        info!("Loaded {} active camera configurations", report.configs.len());
        Ok(report.configs)
    }

    pub async fn load_all_cameras(&self) -> Result<Vec<RuntimeCameraConfig>> {
        Ok(self.assemble_all().await?.configs)
    }

    /// `None` when the camera does not exist or cannot be converted
    pub async fn load_camera_by_id(&self, camera_id: CameraId) -> Result<Option<RuntimeCameraConfig>> {
        let Some(camera) = self.repository.get_camera(camera_id).await? else {
            return Ok(None);
        };

        match self.convert(&camera).await {
            Ok(config) => Ok(Some(config)),
            Err(reason) => {
                warn!("Camera {} has no runtime configuration: {}", camera_id, reason);
                Ok(None)
            }
        }
    }

    /// Stored URL, else the default built from the IP address. Tripwires are not read.
    pub async fn get_camera_stream_url(&self, camera_id: CameraId) -> Result<Option<String>> {
        let Some(camera) = self.repository.get_camera(camera_id).await? else {
            return Ok(None);
        };

        let stored = camera.stream_url.filter(|url| !url.is_empty());
        Ok(stored.or_else(|| {
            camera
                .ip_address
                .as_deref()
                .filter(|ip| !ip.is_empty())
                .map(default_stream_url)
        }))
    }

    /// Fresh read of the active set
    pub async fn refresh_camera_configs(&self) -> Result<Vec<RuntimeCameraConfig>> {
        info!("Refreshing camera configurations");
        self.load_active_cameras().await
    }

    /// Active configurations that also pass the validator
    pub async fn load_validated_active(&self) -> Result<AssemblyReport> {
        let assembled = self.assemble_active().await?;
        let mut report = AssemblyReport {
            configs: Vec::with_capacity(assembled.configs.len()),
            exclusions: assembled.exclusions,
        };

        for config in assembled.configs {
            match self.validator.check(&config) {
                Ok(()) => report.configs.push(config),
                Err(failure) => {
                    report.exclude(config.camera_id, ExclusionReason::ValidationFailed { failure })
                }
            }
        }

        Ok(report)
    }
}
