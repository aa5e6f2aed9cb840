use crate::{
    db::models::{
        CameraId, CameraRecord, CameraStatus, CameraUpdate, NewCamera, NewTripwire, TripwireId,
        TripwireRecord, TripwireUpdate,
    },
    db::repositories::CameraRepository,
    error::Error,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};

const CAMERA_COLUMNS: &str = r#"
    camera_id, camera_name, camera_type, ip_address, stream_url, username, password,
    resolution_width, resolution_height, fps, gpu_id, status, is_active,
    location_description, manufacturer, model, firmware_version, onvif_supported,
    created_at, updated_at
"#;

const TRIPWIRE_COLUMNS: &str = r#"
    id, camera_id, name, position, spacing, direction, detection_type, is_active,
    created_at, updated_at
"#;

/// Inserts made with a store-allocated id; a concurrent writer can claim the same id
const ID_ALLOCATION_ATTEMPTS: usize = 3;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// A caller-supplied id is never reallocated
fn retry_allocation(requested: Option<CameraId>, unique_violation: bool, attempt: usize) -> bool {
    requested.is_none() && unique_violation && attempt < ID_ALLOCATION_ATTEMPTS
}

/// Postgres-backed camera repository
#[derive(Clone)]
pub struct PgCameraRepository {
    pool: Arc<PgPool>,
}

impl PgCameraRepository {
    /// Create a new cameras repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn fetch_cameras(&self, filter: &str) -> Result<Vec<CameraRecord>> {
        let sql = format!(
            "SELECT {} FROM camera_configs {} ORDER BY camera_id",
            CAMERA_COLUMNS, filter
        );

        let cameras = sqlx::query_as::<_, CameraRecord>(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list cameras: {}", e)))?;

        Ok(cameras)
    }

    async fn insert_camera(
        &self,
        record: &CameraRecord,
    ) -> std::result::Result<CameraRecord, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO camera_configs ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20)
            RETURNING {}
            "#,
            CAMERA_COLUMNS, CAMERA_COLUMNS
        );

        sqlx::query_as::<_, CameraRecord>(&sql)
            .bind(record.camera_id)
            .bind(&record.camera_name)
            .bind(record.camera_type)
            .bind(&record.ip_address)
            .bind(&record.stream_url)
            .bind(&record.username)
            .bind(&record.password)
            .bind(record.resolution_width)
            .bind(record.resolution_height)
            .bind(record.fps)
            .bind(record.gpu_id)
            .bind(record.status)
            .bind(record.is_active)
            .bind(&record.location_description)
            .bind(&record.manufacturer)
            .bind(&record.model)
            .bind(&record.firmware_version)
            .bind(record.onvif_supported)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(&*self.pool)
            .await
    }
}

#[async_trait]
impl CameraRepository for PgCameraRepository {
    async fn create_camera(&self, camera: NewCamera) -> Result<CameraRecord> {
        let requested = camera.camera_id;
        let camera_id = match requested {
            Some(id) => id,
            None => self.next_camera_id().await?,
        };
        info!("Creating camera {}: {}", camera_id, camera.camera_name);

        let mut record = CameraRecord::from_new(camera_id, camera, Utc::now());
        let mut attempt = 1;

        loop {
            match self.insert_camera(&record).await {
                Ok(created) => return Ok(created),
                Err(e) if retry_allocation(requested, is_unique_violation(&e), attempt) => {
                    attempt += 1;
                    record.camera_id = self.next_camera_id().await?;
                    debug!(
                        "Camera id taken concurrently, retrying with {}",
                        record.camera_id
                    );
                }
                Err(e) if is_unique_violation(&e) => {
                    return Err(Error::AlreadyExists(format!(
                        "Camera {} already exists",
                        record.camera_id
                    ))
                    .into())
                }
                Err(e) => {
                    return Err(Error::Database(format!("Failed to create camera: {}", e)).into())
                }
            }
        }
    }

    async fn get_camera(&self, camera_id: CameraId) -> Result<Option<CameraRecord>> {
        let sql = format!(
            "SELECT {} FROM camera_configs WHERE camera_id = $1",
            CAMERA_COLUMNS
        );

        let result = sqlx::query_as::<_, CameraRecord>(&sql)
            .bind(camera_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get camera by ID: {}", e)))?;

        Ok(result)
    }

    async fn list_cameras(&self) -> Result<Vec<CameraRecord>> {
        self.fetch_cameras("").await
    }

    async fn list_active_cameras(&self) -> Result<Vec<CameraRecord>> {
        self.fetch_cameras("WHERE is_active = TRUE").await
    }

    async fn list_cameras_by_status(&self, status: CameraStatus) -> Result<Vec<CameraRecord>> {
        let sql = format!(
            "SELECT {} FROM camera_configs WHERE status = $1 ORDER BY camera_id",
            CAMERA_COLUMNS
        );

        let cameras = sqlx::query_as::<_, CameraRecord>(&sql)
            .bind(status)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list cameras by status: {}", e)))?;

        Ok(cameras)
    }

    async fn find_by_ip(&self, ip_address: &str) -> Result<Option<CameraRecord>> {
        let sql = format!(
            "SELECT {} FROM camera_configs WHERE ip_address = $1 ORDER BY camera_id LIMIT 1",
            CAMERA_COLUMNS
        );

        let result = sqlx::query_as::<_, CameraRecord>(&sql)
            .bind(ip_address)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get camera by IP: {}", e)))?;

        Ok(result)
    }

    async fn update_camera(
        &self,
        camera_id: CameraId,
        update: &CameraUpdate,
    ) -> Result<Option<CameraRecord>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let select = format!(
            "SELECT {} FROM camera_configs WHERE camera_id = $1 FOR UPDATE",
            CAMERA_COLUMNS
        );
        let current = sqlx::query_as::<_, CameraRecord>(&select)
            .bind(camera_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to load camera: {}", e)))?;

        let Some(mut camera) = current else {
            return Ok(None);
        };
        update.apply(&mut camera, Utc::now());

        let sql = format!(
            r#"
            UPDATE camera_configs
            SET camera_name = $1, camera_type = $2, ip_address = $3, stream_url = $4,
                username = $5, password = $6, resolution_width = $7, resolution_height = $8,
                fps = $9, gpu_id = $10, status = $11, is_active = $12,
                location_description = $13, manufacturer = $14, model = $15,
                firmware_version = $16, onvif_supported = $17, updated_at = $18
            WHERE camera_id = $19
            RETURNING {}
            "#,
            CAMERA_COLUMNS
        );

        let result = sqlx::query_as::<_, CameraRecord>(&sql)
            .bind(&camera.camera_name)
            .bind(camera.camera_type)
            .bind(&camera.ip_address)
            .bind(&camera.stream_url)
            .bind(&camera.username)
            .bind(&camera.password)
            .bind(camera.resolution_width)
            .bind(camera.resolution_height)
            .bind(camera.fps)
            .bind(camera.gpu_id)
            .bind(camera.status)
            .bind(camera.is_active)
            .bind(&camera.location_description)
            .bind(&camera.manufacturer)
            .bind(&camera.model)
            .bind(&camera.firmware_version)
            .bind(camera.onvif_supported)
            .bind(camera.updated_at)
            .bind(camera_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to update camera: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit camera update: {}", e)))?;

        Ok(Some(result))
    }

    async fn set_active(&self, camera_id: CameraId, is_active: bool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE camera_configs
            SET is_active = $1, updated_at = $2
            WHERE camera_id = $3
            "#,
        )
        .bind(is_active)
        .bind(Utc::now())
        .bind(camera_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update camera activation: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_camera(&self, camera_id: CameraId) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let tripwires = sqlx::query("DELETE FROM tripwires WHERE camera_id = $1")
            .bind(camera_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete tripwires: {}", e)))?;

        let result = sqlx::query("DELETE FROM camera_configs WHERE camera_id = $1")
            .bind(camera_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete camera: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit camera delete: {}", e)))?;

        debug!(
            "Deleted camera {} with {} tripwires",
            camera_id,
            tripwires.rows_affected()
        );

        Ok(result.rows_affected() > 0)
    }

    async fn next_camera_id(&self) -> Result<CameraId> {
        let next: i32 =
            sqlx::query_scalar("SELECT COALESCE(MAX(camera_id), 0) + 1 FROM camera_configs")
                .fetch_one(&*self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to allocate camera id: {}", e)))?;

        Ok(next)
    }

    async fn create_tripwire(
        &self,
        camera_id: CameraId,
        tripwire: &NewTripwire,
    ) -> Result<Option<TripwireRecord>> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO tripwires (
                camera_id, name, position, spacing, direction, detection_type, is_active,
                created_at, updated_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9
            WHERE EXISTS (SELECT 1 FROM camera_configs WHERE camera_id = $1)
            RETURNING {}
            "#,
            TRIPWIRE_COLUMNS
        );

        let result = sqlx::query_as::<_, TripwireRecord>(&sql)
            .bind(camera_id)
            .bind(&tripwire.name)
            .bind(tripwire.position)
            .bind(tripwire.spacing)
            .bind(tripwire.direction.as_str())
            .bind(tripwire.detection_type.as_str())
            .bind(tripwire.is_active)
            .bind(now)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to create tripwire: {}", e)))?;

        Ok(result)
    }

    async fn get_tripwire(&self, tripwire_id: TripwireId) -> Result<Option<TripwireRecord>> {
        let sql = format!("SELECT {} FROM tripwires WHERE id = $1", TRIPWIRE_COLUMNS);

        let result = sqlx::query_as::<_, TripwireRecord>(&sql)
            .bind(tripwire_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get tripwire: {}", e)))?;

        Ok(result)
    }

    async fn get_camera_tripwires(&self, camera_id: CameraId) -> Result<Vec<TripwireRecord>> {
        let sql = format!(
            "SELECT {} FROM tripwires WHERE camera_id = $1 ORDER BY id",
            TRIPWIRE_COLUMNS
        );

        let result = sqlx::query_as::<_, TripwireRecord>(&sql)
            .bind(camera_id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get camera tripwires: {}", e)))?;

        Ok(result)
    }

    async fn update_tripwire(
        &self,
        tripwire_id: TripwireId,
        update: &TripwireUpdate,
    ) -> Result<Option<TripwireRecord>> {
        let Some(mut tripwire) = self.get_tripwire(tripwire_id).await? else {
            return Ok(None);
        };
        update.apply(&mut tripwire, Utc::now());

        let sql = format!(
            r#"
            UPDATE tripwires
            SET name = $1, position = $2, spacing = $3, direction = $4,
                detection_type = $5, is_active = $6, updated_at = $7
            WHERE id = $8
            RETURNING {}
            "#,
            TRIPWIRE_COLUMNS
        );

        let result = sqlx::query_as::<_, TripwireRecord>(&sql)
            .bind(&tripwire.name)
            .bind(tripwire.position)
            .bind(tripwire.spacing)
            .bind(&tripwire.direction)
            .bind(&tripwire.detection_type)
            .bind(tripwire.is_active)
            .bind(tripwire.updated_at)
            .bind(tripwire_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to update tripwire: {}", e)))?;

        Ok(result)
    }

    async fn delete_tripwire(&self, tripwire_id: TripwireId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tripwires WHERE id = $1")
            .bind(tripwire_id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete tripwire: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_allocated_ids_are_retried() {
        assert!(retry_allocation(None, true, 1));
        assert!(retry_allocation(None, true, ID_ALLOCATION_ATTEMPTS - 1));
        assert!(!retry_allocation(None, true, ID_ALLOCATION_ATTEMPTS));
        assert!(!retry_allocation(Some(7), true, 1));
        assert!(!retry_allocation(None, false, 1));
    }
}
