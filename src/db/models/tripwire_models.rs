use super::camera_models::CameraId;
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TripwireId = i32;

pub const DEFAULT_TRIPWIRE_SPACING: f64 = 0.01;

/// Axis a tripwire is laid across
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripwireDirection {
    Horizontal,
    Vertical,
}

impl TripwireDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripwireDirection::Horizontal => "horizontal",
            TripwireDirection::Vertical => "vertical",
        }
    }
}

impl FromStr for TripwireDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "horizontal" => Ok(TripwireDirection::Horizontal),
            "vertical" => Ok(TripwireDirection::Vertical),
            other => Err(Error::Validation(format!(
                "Unknown tripwire direction: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TripwireDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crossing event a tripwire reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionType {
    Entry,
    Exit,
    Counting,
}

impl DetectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionType::Entry => "entry",
            DetectionType::Exit => "exit",
            DetectionType::Counting => "counting",
        }
    }
}

impl Default for DetectionType {
    fn default() -> Self {
        DetectionType::Entry
    }
}

/// Tripwire as persisted in `tripwires`.
///
/// `direction` and `detection_type` are kept as stored text: rows written by
/// other tools are not guaranteed to hold a known value, and the runtime
/// validator is what rejects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TripwireRecord {
    pub id: TripwireId,
    pub camera_id: CameraId,
    pub name: String,
    pub position: f64,
    pub spacing: f64,
    pub direction: String,
    pub detection_type: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripwireRecord {
    pub fn from_new(
        id: TripwireId,
        camera_id: CameraId,
        new: &NewTripwire,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            camera_id,
            name: new.name.clone(),
            position: new.position,
            spacing: new.spacing,
            direction: new.direction.as_str().to_string(),
            detection_type: new.detection_type.as_str().to_string(),
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

fn default_spacing() -> f64 {
    DEFAULT_TRIPWIRE_SPACING
}

fn default_true() -> bool {
    true
}

fn check_position(position: f64) -> Result<(), Error> {
    if (0.0..=1.0).contains(&position) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Tripwire position must be within [0.0, 1.0], got {}",
            position
        )))
    }
}

fn check_spacing(spacing: f64) -> Result<(), Error> {
    if spacing.is_finite() && spacing >= 0.0 {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Tripwire spacing must be a non-negative number, got {}",
            spacing
        )))
    }
}

/// Input for creating a tripwire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTripwire {
    pub name: String,
    pub position: f64,
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    pub direction: TripwireDirection,
    #[serde(default)]
    pub detection_type: DetectionType,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewTripwire {
    pub fn new(name: impl Into<String>, position: f64, direction: TripwireDirection) -> Self {
        Self {
            name: name.into(),
            position,
            spacing: DEFAULT_TRIPWIRE_SPACING,
            direction,
            detection_type: DetectionType::default(),
            is_active: true,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Tripwire name must not be empty".to_string()));
        }
        check_position(self.position)?;
        check_spacing(self.spacing)
    }
}

/// Partial tripwire update; only `Some` fields are applied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripwireUpdate {
    pub name: Option<String>,
    pub position: Option<f64>,
    pub spacing: Option<f64>,
    pub direction: Option<TripwireDirection>,
    pub detection_type: Option<DetectionType>,
    pub is_active: Option<bool>,
}

impl TripwireUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("Tripwire name must not be empty".to_string()));
            }
        }
        if let Some(position) = self.position {
            check_position(position)?;
        }
        if let Some(spacing) = self.spacing {
            check_spacing(spacing)?;
        }
        Ok(())
    }

    pub fn apply(&self, tripwire: &mut TripwireRecord, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            tripwire.name = name.clone();
        }
        if let Some(position) = self.position {
            tripwire.position = position;
        }
        if let Some(spacing) = self.spacing {
            tripwire.spacing = spacing;
        }
        if let Some(direction) = self.direction {
            tripwire.direction = direction.as_str().to_string();
        }
        if let Some(detection_type) = self.detection_type {
            tripwire.detection_type = detection_type.as_str().to_string();
        }
        if let Some(is_active) = self.is_active {
            tripwire.is_active = is_active;
        }
        tripwire.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_defaults_match_columns() {
        let new: NewTripwire = serde_json::from_value(serde_json::json!({
            "name": "door",
            "position": 0.5,
            "direction": "vertical"
        }))
        .unwrap();

        assert_eq!(new.spacing, DEFAULT_TRIPWIRE_SPACING);
        assert_eq!(new.detection_type, DetectionType::Entry);
        assert!(new.is_active);
        assert!(new.validate().is_ok());
    }

    #[test]
    fn unknown_direction_is_rejected_at_the_boundary() {
        let parsed = serde_json::from_value::<NewTripwire>(serde_json::json!({
            "name": "door",
            "position": 0.5,
            "direction": "diagonal"
        }));
        assert!(parsed.is_err());
        assert!("diagonal".parse::<TripwireDirection>().is_err());
    }

    #[test]
    fn position_outside_unit_range_fails_validation() {
        let mut new = NewTripwire::new("door", 1.2, TripwireDirection::Horizontal);
        assert!(new.validate().is_err());
        new.position = f64::NAN;
        assert!(new.validate().is_err());
        new.position = 1.0;
        assert!(new.validate().is_ok());
    }

    #[test]
    fn update_checks_only_present_fields() {
        let update = TripwireUpdate {
            spacing: Some(-0.5),
            ..TripwireUpdate::default()
        };
        assert!(update.validate().is_err());
        assert!(TripwireUpdate::default().validate().is_ok());
    }
}
