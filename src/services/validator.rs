use crate::db::models::{CameraId, TripwireDirection};
use crate::services::assembler::RuntimeCameraConfig;
use log::error;
use serde::Serialize;
use std::fmt;

/// First check a runtime configuration failed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationFailure {
    MissingCameraId,
    EmptyCameraName,
    MissingEndpoint,
    InvalidResolution { width: i32, height: i32 },
    InvalidFps { fps: i32 },
    TripwirePositionOutOfRange { tripwire: String, position: f64 },
    InvalidTripwireDirection { tripwire: String, direction: String },
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::MissingCameraId => write!(f, "camera_id is required"),
            ValidationFailure::EmptyCameraName => write!(f, "camera_name is required"),
            ValidationFailure::MissingEndpoint => {
                write!(f, "either stream_url or ip_address is required")
            }
            ValidationFailure::InvalidResolution { width, height } => {
                write!(f, "invalid resolution {}x{}", width, height)
            }
            ValidationFailure::InvalidFps { fps } => write!(f, "fps must be positive, got {}", fps),
            ValidationFailure::TripwirePositionOutOfRange { tripwire, position } => write!(
                f,
                "tripwire '{}' position {} is outside [0.0, 1.0]",
                tripwire, position
            ),
            ValidationFailure::InvalidTripwireDirection {
                tripwire,
                direction,
            } => write!(
                f,
                "tripwire '{}' has invalid direction '{}'",
                tripwire, direction
            ),
        }
    }
}

/// Pass/fail gate applied to runtime configuration before it reaches the engine.
///
/// Checks run in a fixed order and stop at the first failure. Nothing is repaired.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationValidator;

impl ConfigurationValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, config: &RuntimeCameraConfig) -> Result<(), ValidationFailure> {
        if config.camera_id == 0 {
            return Err(ValidationFailure::MissingCameraId);
        }

        if config.camera_name.is_empty() {
            return Err(ValidationFailure::EmptyCameraName);
        }

        let has_endpoint = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        if !has_endpoint(&config.stream_url) && !has_endpoint(&config.ip_address) {
            return Err(ValidationFailure::MissingEndpoint);
        }

        let (width, height) = config.resolution;
        if width <= 0 || height <= 0 {
            return Err(ValidationFailure::InvalidResolution { width, height });
        }

        if config.fps <= 0 {
            return Err(ValidationFailure::InvalidFps { fps: config.fps });
        }

        for tripwire in &config.tripwires {
            if !(0.0..=1.0).contains(&tripwire.position) {
                return Err(ValidationFailure::TripwirePositionOutOfRange {
                    tripwire: tripwire.name.clone(),
                    position: tripwire.position,
                });
            }
            if tripwire.direction.parse::<TripwireDirection>().is_err() {
                return Err(ValidationFailure::InvalidTripwireDirection {
                    tripwire: tripwire.name.clone(),
                    direction: tripwire.direction.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn validate(&self, config: &RuntimeCameraConfig) -> bool {
        match self.check(config) {
            Ok(()) => true,
            Err(failure) => {
                log_failure(config.camera_id, &failure);
                false
            }
        }
    }
}

fn log_failure(camera_id: CameraId, failure: &ValidationFailure) {
    error!("Camera {} failed validation: {}", camera_id, failure);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CameraType;
    use crate::services::assembler::RuntimeTripwireConfig;

    fn config() -> RuntimeCameraConfig {
        RuntimeCameraConfig {
            camera_id: 3,
            gpu_id: 0,
            camera_type: CameraType::Entry,
            camera_name: "Lobby".to_string(),
            ip_address: Some("10.0.0.5".to_string()),
            stream_url: Some("rtsp://10.0.0.5:554/stream1".to_string()),
            username: None,
            password: None,
            tripwires: vec![],
            resolution: (1920, 1080),
            fps: 30,
            is_active: true,
        }
    }

    fn tripwire(position: f64, direction: &str) -> RuntimeTripwireConfig {
        RuntimeTripwireConfig {
            position,
            spacing: 0.01,
            direction: direction.to_string(),
            name: "line".to_string(),
            detection_type: "entry".to_string(),
            is_active: true,
        }
    }

    #[test]
    fn well_formed_config_passes() {
        let mut config = config();
        config.tripwires = vec![tripwire(0.0, "horizontal"), tripwire(1.0, "vertical")];
        assert!(ConfigurationValidator.validate(&config));
    }

    #[test]
    fn tripwire_fails_iff_position_or_direction_is_bad() {
        let cases = [
            (0.5, "vertical", true),
            (-0.01, "vertical", false),
            (1.01, "horizontal", false),
            (f64::NAN, "horizontal", false),
            (0.5, "diagonal", false),
            (0.5, "Vertical", false),
        ];

        for (position, direction, expected) in cases {
            let mut config = config();
            config.tripwires = vec![tripwire(position, direction)];
            assert_eq!(
                ConfigurationValidator.validate(&config),
                expected,
                "position={} direction={}",
                position,
                direction
            );
        }
    }

    #[test]
    fn non_positive_fps_fails() {
        for fps in [0, -1] {
            let mut config = config();
            config.fps = fps;
            assert_eq!(
                ConfigurationValidator.check(&config),
                Err(ValidationFailure::InvalidFps { fps })
            );
        }
    }

    #[test]
    fn missing_both_endpoints_fails() {
        let mut config = config();
        config.ip_address = None;
        config.stream_url = None;
        assert_eq!(
            ConfigurationValidator.check(&config),
            Err(ValidationFailure::MissingEndpoint)
        );

        config.stream_url = Some("rtsp://cam/live".to_string());
        assert!(ConfigurationValidator.check(&config).is_ok());
    }

    #[test]
    fn checks_short_circuit_in_order() {
        let mut config = config();
        config.camera_id = 0;
        config.camera_name = String::new();
        config.fps = 0;
        assert_eq!(
            ConfigurationValidator.check(&config),
            Err(ValidationFailure::MissingCameraId)
        );

        config.camera_id = 9;
        assert_eq!(
            ConfigurationValidator.check(&config),
            Err(ValidationFailure::EmptyCameraName)
        );
    }

    #[test]
    fn blank_but_non_empty_name_passes() {
        let mut config = config();
        config.camera_name = "  ".to_string();
        assert_eq!(ConfigurationValidator.check(&config), Ok(()));
    }

    #[test]
    fn zero_sized_resolution_fails() {
        let mut config = config();
        config.resolution = (1280, 0);
        assert_eq!(
            ConfigurationValidator.check(&config),
            Err(ValidationFailure::InvalidResolution {
                width: 1280,
                height: 0
            })
        );
    }
}
