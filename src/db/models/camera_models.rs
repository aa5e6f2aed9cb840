use super::tripwire_models::{NewTripwire, TripwireRecord};
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type CameraId = i32;

/// Role of a camera in the attendance flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraType {
    Entry,
    Exit,
    General,
}

impl CameraType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraType::Entry => "entry",
            CameraType::Exit => "exit",
            CameraType::General => "general",
        }
    }
}

impl Default for CameraType {
    fn default() -> Self {
        CameraType::Entry
    }
}

impl FromStr for CameraType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "entry" => Ok(CameraType::Entry),
            "exit" => Ok(CameraType::Exit),
            "general" => Ok(CameraType::General),
            other => Err(Error::Validation(format!("Unknown camera type: {}", other))),
        }
    }
}

impl fmt::Display for CameraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a camera record.
///
/// Descriptive only: runtime eligibility is decided by `is_active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Discovered,
    Configured,
    Active,
    Inactive,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Discovered => "discovered",
            CameraStatus::Configured => "configured",
            CameraStatus::Active => "active",
            CameraStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for CameraStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discovered" => Ok(CameraStatus::Discovered),
            "configured" => Ok(CameraStatus::Configured),
            "active" => Ok(CameraStatus::Active),
            "inactive" => Ok(CameraStatus::Inactive),
            other => Err(Error::Validation(format!("Unknown camera status: {}", other))),
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Both enums live in TEXT columns
impl sqlx::Type<sqlx::Postgres> for CameraType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CameraType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(text.parse::<CameraType>()?)
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for CameraType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Postgres> for CameraStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CameraStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(text.parse::<CameraStatus>()?)
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for CameraStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Camera record as persisted in `camera_configs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CameraRecord {
    pub camera_id: CameraId,
    pub camera_name: String,
    pub camera_type: CameraType,
    pub ip_address: Option<String>,
    pub stream_url: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub resolution_width: i32,
    pub resolution_height: i32,
    pub fps: i32,
    pub gpu_id: i32,
    pub status: CameraStatus,
    pub is_active: bool,
    pub location_description: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub onvif_supported: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CameraRecord {
    /// Build a record from creation input, stamping both timestamps with `now`
    pub fn from_new(camera_id: CameraId, new: NewCamera, now: DateTime<Utc>) -> Self {
        Self {
            camera_id,
            camera_name: new.camera_name,
            camera_type: new.camera_type,
            ip_address: new.ip_address,
            stream_url: new.stream_url,
            username: new.username,
            password: new.password,
            resolution_width: new.resolution_width,
            resolution_height: new.resolution_height,
            fps: new.fps,
            gpu_id: new.gpu_id,
            status: new.status,
            is_active: new.is_active,
            location_description: new.location_description,
            manufacturer: new.manufacturer,
            model: new.model,
            firmware_version: new.firmware_version,
            onvif_supported: new.onvif_supported,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status as reported to callers; `is_active` overrides the stored value.
    pub fn effective_status(&self) -> CameraStatus {
        match (self.is_active, self.status) {
            (true, _) => CameraStatus::Active,
            (false, CameraStatus::Active) => CameraStatus::Inactive,
            (false, status) => status,
        }
    }
}

fn default_resolution_width() -> i32 {
    1920
}

fn default_resolution_height() -> i32 {
    1080
}

fn default_fps() -> i32 {
    30
}

fn default_new_status() -> CameraStatus {
    CameraStatus::Configured
}

/// Input for creating a camera record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCamera {
    /// Allocated by the store when omitted
    #[serde(default)]
    pub camera_id: Option<CameraId>,
    pub camera_name: String,
    #[serde(default)]
    pub camera_type: CameraType,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_resolution_width")]
    pub resolution_width: i32,
    #[serde(default = "default_resolution_height")]
    pub resolution_height: i32,
    #[serde(default = "default_fps")]
    pub fps: i32,
    #[serde(default)]
    pub gpu_id: i32,
    /// Administrative creation always lands in `configured`
    #[serde(skip_deserializing, default = "default_new_status")]
    pub status: CameraStatus,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub location_description: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub onvif_supported: bool,
}

impl NewCamera {
    pub fn named(camera_name: impl Into<String>) -> Self {
        Self {
            camera_id: None,
            camera_name: camera_name.into(),
            camera_type: CameraType::default(),
            ip_address: None,
            stream_url: None,
            username: None,
            password: None,
            resolution_width: default_resolution_width(),
            resolution_height: default_resolution_height(),
            fps: default_fps(),
            gpu_id: 0,
            status: default_new_status(),
            is_active: false,
            location_description: None,
            manufacturer: None,
            model: None,
            firmware_version: None,
            onvif_supported: false,
        }
    }
}

/// Partial camera update; only `Some` fields are applied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraUpdate {
    pub camera_name: Option<String>,
    pub camera_type: Option<CameraType>,
    pub ip_address: Option<String>,
    pub stream_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub resolution_width: Option<i32>,
    pub resolution_height: Option<i32>,
    pub fps: Option<i32>,
    pub gpu_id: Option<i32>,
    pub status: Option<CameraStatus>,
    pub is_active: Option<bool>,
    pub location_description: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub onvif_supported: Option<bool>,
}

impl CameraUpdate {
    pub fn apply(&self, camera: &mut CameraRecord, now: DateTime<Utc>) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set(&mut camera.camera_name, &self.camera_name);
        set(&mut camera.camera_type, &self.camera_type);
        set_opt(&mut camera.ip_address, &self.ip_address);
        set_opt(&mut camera.stream_url, &self.stream_url);
        set_opt(&mut camera.username, &self.username);
        set_opt(&mut camera.password, &self.password);
        set(&mut camera.resolution_width, &self.resolution_width);
        set(&mut camera.resolution_height, &self.resolution_height);
        set(&mut camera.fps, &self.fps);
        set(&mut camera.gpu_id, &self.gpu_id);
        set(&mut camera.status, &self.status);
        set(&mut camera.is_active, &self.is_active);
        set_opt(&mut camera.location_description, &self.location_description);
        set_opt(&mut camera.manufacturer, &self.manufacturer);
        set_opt(&mut camera.model, &self.model);
        set_opt(&mut camera.firmware_version, &self.firmware_version);
        set(&mut camera.onvif_supported, &self.onvif_supported);
        camera.updated_at = now;
    }
}

/// Configuration of a discovered camera: settings plus its tripwires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureCamera {
    pub camera_name: String,
    #[serde(default)]
    pub camera_type: CameraType,
    #[serde(default)]
    pub location_description: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub resolution_width: Option<i32>,
    #[serde(default)]
    pub resolution_height: Option<i32>,
    #[serde(default)]
    pub fps: Option<i32>,
    #[serde(default)]
    pub gpu_id: Option<i32>,
    #[serde(default)]
    pub tripwires: Vec<NewTripwire>,
}

impl ConfigureCamera {
    /// Camera fields of the request, moving the record to `configured`
    pub fn camera_update(&self) -> CameraUpdate {
        CameraUpdate {
            camera_name: Some(self.camera_name.clone()),
            camera_type: Some(self.camera_type),
            location_description: self.location_description.clone(),
            stream_url: self.stream_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            resolution_width: self.resolution_width,
            resolution_height: self.resolution_height,
            fps: self.fps,
            gpu_id: self.gpu_id,
            status: Some(CameraStatus::Configured),
            ..CameraUpdate::default()
        }
    }
}

/// Camera with its tripwires, as returned by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct CameraWithTripwires {
    #[serde(flatten)]
    pub camera: CameraRecord,
    pub tripwires: Vec<TripwireRecord>,
}
