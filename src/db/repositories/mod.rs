use crate::db::models::{
    CameraId, CameraRecord, CameraStatus, CameraUpdate, NewCamera, NewTripwire, TripwireId,
    TripwireRecord, TripwireUpdate,
};
use anyhow::Result;
use async_trait::async_trait;

pub mod cameras;
pub mod memory;

pub use cameras::PgCameraRepository;
pub use memory::InMemoryCameraRepository;

/// Store of camera and tripwire records.
///
/// A camera exclusively owns its tripwires: deleting a camera removes every
/// tripwire keyed to it. Lookups of absent ids return `None`/`false`, leaving
/// the NotFound decision to the caller.
#[async_trait]
pub trait CameraRepository: Send + Sync {
    /// Persist a new camera, allocating `camera_id` when the input has none.
    /// A duplicate `camera_id` fails with `Error::AlreadyExists`.
    async fn create_camera(&self, camera: NewCamera) -> Result<CameraRecord>;

    async fn get_camera(&self, camera_id: CameraId) -> Result<Option<CameraRecord>>;

    /// All cameras ordered by `camera_id`
    async fn list_cameras(&self) -> Result<Vec<CameraRecord>>;

    /// Cameras with `is_active = true`, ordered by `camera_id`
    async fn list_active_cameras(&self) -> Result<Vec<CameraRecord>>;

    async fn list_cameras_by_status(&self, status: CameraStatus) -> Result<Vec<CameraRecord>>;

    async fn find_by_ip(&self, ip_address: &str) -> Result<Option<CameraRecord>>;

    async fn update_camera(
        &self,
        camera_id: CameraId,
        update: &CameraUpdate,
    ) -> Result<Option<CameraRecord>>;

    async fn set_active(&self, camera_id: CameraId, is_active: bool) -> Result<bool>;

    /// Delete a camera together with all of its tripwires
    async fn delete_camera(&self, camera_id: CameraId) -> Result<bool>;

    async fn next_camera_id(&self) -> Result<CameraId>;

    /// `None` when the owning camera does not exist
    async fn create_tripwire(
        &self,
        camera_id: CameraId,
        tripwire: &NewTripwire,
    ) -> Result<Option<TripwireRecord>>;

    async fn get_tripwire(&self, tripwire_id: TripwireId) -> Result<Option<TripwireRecord>>;

    /// Tripwires of a camera in insertion order
    async fn get_camera_tripwires(&self, camera_id: CameraId) -> Result<Vec<TripwireRecord>>;

    async fn update_tripwire(
        &self,
        tripwire_id: TripwireId,
        update: &TripwireUpdate,
    ) -> Result<Option<TripwireRecord>>;

    async fn delete_tripwire(&self, tripwire_id: TripwireId) -> Result<bool>;
}
