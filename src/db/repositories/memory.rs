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
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Camera table keyed by id; tripwires stored under their owning camera id
/// with a reverse index from tripwire id to owner.
#[derive(Default)]
struct Tables {
    cameras: BTreeMap<CameraId, CameraRecord>,
    tripwires: HashMap<CameraId, Vec<TripwireRecord>>,
    tripwire_owner: HashMap<TripwireId, CameraId>,
    last_tripwire_id: TripwireId,
}

impl Tables {
    fn tripwire_mut(&mut self, tripwire_id: TripwireId) -> Option<&mut TripwireRecord> {
        let owner = *self.tripwire_owner.get(&tripwire_id)?;
        self.tripwires
            .get_mut(&owner)?
            .iter_mut()
            .find(|t| t.id == tripwire_id)
    }
}

/// In-process camera repository, used when no database is configured and in tests
#[derive(Default)]
pub struct InMemoryCameraRepository {
    tables: RwLock<Tables>,
}

impl InMemoryCameraRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::Internal("camera store lock poisoned".to_string()).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::Internal("camera store lock poisoned".to_string()).into())
    }

    fn select<F>(&self, predicate: F) -> Result<Vec<CameraRecord>>
    where
        F: Fn(&CameraRecord) -> bool,
    {
        let tables = self.read()?;
        Ok(tables
            .cameras
            .values()
            .filter(|camera| predicate(camera))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CameraRepository for InMemoryCameraRepository {
    async fn create_camera(&self, camera: NewCamera) -> Result<CameraRecord> {
        let mut tables = self.write()?;

        let camera_id = match camera.camera_id {
            Some(id) => id,
            None => tables.cameras.keys().next_back().map_or(1, |id| id + 1),
        };
        if tables.cameras.contains_key(&camera_id) {
            return Err(Error::AlreadyExists(format!("Camera {} already exists", camera_id)).into());
        }

        let record = CameraRecord::from_new(camera_id, camera, Utc::now());
        tables.cameras.insert(camera_id, record.clone());
        debug!("Stored camera {} in memory", camera_id);

        Ok(record)
    }

    async fn get_camera(&self, camera_id: CameraId) -> Result<Option<CameraRecord>> {
        Ok(self.read()?.cameras.get(&camera_id).cloned())
    }

    async fn list_cameras(&self) -> Result<Vec<CameraRecord>> {
        self.select(|_| true)
    }

    async fn list_active_cameras(&self) -> Result<Vec<CameraRecord>> {
        self.select(|camera| camera.is_active)
    }

    async fn list_cameras_by_status(&self, status: CameraStatus) -> Result<Vec<CameraRecord>> {
        self.select(|camera| camera.status == status)
    }

    async fn find_by_ip(&self, ip_address: &str) -> Result<Option<CameraRecord>> {
        let tables = self.read()?;
        Ok(tables
            .cameras
            .values()
            .find(|camera| camera.ip_address.as_deref() == Some(ip_address))
            .cloned())
    }

    async fn update_camera(
        &self,
        camera_id: CameraId,
        update: &CameraUpdate,
    ) -> Result<Option<CameraRecord>> {
        let mut tables = self.write()?;
        Ok(tables.cameras.get_mut(&camera_id).map(|camera| {
            update.apply(camera, Utc::now());
            camera.clone()
        }))
    }

    async fn set_active(&self, camera_id: CameraId, is_active: bool) -> Result<bool> {
        let mut tables = self.write()?;
        match tables.cameras.get_mut(&camera_id) {
            Some(camera) => {
                camera.is_active = is_active;
                camera.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_camera(&self, camera_id: CameraId) -> Result<bool> {
        let mut tables = self.write()?;
        if tables.cameras.remove(&camera_id).is_none() {
            return Ok(false);
        }

        let owned = tables.tripwires.remove(&camera_id).unwrap_or_default();
        for tripwire in &owned {
            tables.tripwire_owner.remove(&tripwire.id);
        }
        debug!("Deleted camera {} with {} tripwires", camera_id, owned.len());

        Ok(true)
    }

    async fn next_camera_id(&self) -> Result<CameraId> {
        Ok(self
            .read()?
            .cameras
            .keys()
            .next_back()
            .map_or(1, |id| id + 1))
    }

    async fn create_tripwire(
        &self,
        camera_id: CameraId,
        tripwire: &NewTripwire,
    ) -> Result<Option<TripwireRecord>> {
        let mut tables = self.write()?;
        if !tables.cameras.contains_key(&camera_id) {
            return Ok(None);
        }

        tables.last_tripwire_id += 1;
        let id = tables.last_tripwire_id;
        let record = TripwireRecord::from_new(id, camera_id, tripwire, Utc::now());

        tables
            .tripwires
            .entry(camera_id)
            .or_default()
            .push(record.clone());
        tables.tripwire_owner.insert(id, camera_id);

        Ok(Some(record))
    }

    async fn get_tripwire(&self, tripwire_id: TripwireId) -> Result<Option<TripwireRecord>> {
        let tables = self.read()?;
        let Some(owner) = tables.tripwire_owner.get(&tripwire_id) else {
            return Ok(None);
        };
        Ok(tables
            .tripwires
            .get(owner)
            .and_then(|owned| owned.iter().find(|t| t.id == tripwire_id))
            .cloned())
    }

    async fn get_camera_tripwires(&self, camera_id: CameraId) -> Result<Vec<TripwireRecord>> {
        Ok(self
            .read()?
            .tripwires
            .get(&camera_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_tripwire(
        &self,
        tripwire_id: TripwireId,
        update: &TripwireUpdate,
    ) -> Result<Option<TripwireRecord>> {
        let mut tables = self.write()?;
        Ok(tables.tripwire_mut(tripwire_id).map(|tripwire| {
            update.apply(tripwire, Utc::now());
            tripwire.clone()
        }))
    }

    async fn delete_tripwire(&self, tripwire_id: TripwireId) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(owner) = tables.tripwire_owner.remove(&tripwire_id) else {
            return Ok(false);
        };
        if let Some(owned) = tables.tripwires.get_mut(&owner) {
            owned.retain(|t| t.id != tripwire_id);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TripwireDirection;

    async fn camera(repo: &InMemoryCameraRepository, camera_id: Option<CameraId>) -> CameraRecord {
        let mut new = NewCamera::named("Front door");
        new.camera_id = camera_id;
        repo.create_camera(new).await.unwrap()
    }

    #[tokio::test]
    async fn allocates_ids_after_the_highest_existing() -> Result<()> {
        let repo = InMemoryCameraRepository::new();
        assert_eq!(repo.next_camera_id().await?, 1);

        camera(&repo, Some(7)).await;
        let allocated = camera(&repo, None).await;

        assert_eq!(allocated.camera_id, 8);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_camera_id_is_rejected() {
        let repo = InMemoryCameraRepository::new();
        camera(&repo, Some(3)).await;

        let mut duplicate = NewCamera::named("Other");
        duplicate.camera_id = Some(3);
        let err = repo.create_camera(duplicate).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_camera_removes_its_tripwires() -> Result<()> {
        let repo = InMemoryCameraRepository::new();
        let cam = camera(&repo, Some(1)).await;
        let other = camera(&repo, Some(2)).await;

        let wire = NewTripwire::new("line", 0.5, TripwireDirection::Vertical);
        let first = repo.create_tripwire(cam.camera_id, &wire).await?.unwrap();
        repo.create_tripwire(cam.camera_id, &wire).await?;
        repo.create_tripwire(other.camera_id, &wire).await?;

        assert!(repo.delete_camera(cam.camera_id).await?);

        assert!(repo.get_camera_tripwires(cam.camera_id).await?.is_empty());
        assert!(repo.get_tripwire(first.id).await?.is_none());
        assert_eq!(repo.get_camera_tripwires(other.camera_id).await?.len(), 1);
        assert!(!repo.delete_camera(cam.camera_id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn tripwire_for_missing_camera_is_not_created() -> Result<()> {
        let repo = InMemoryCameraRepository::new();
        let wire = NewTripwire::new("line", 0.5, TripwireDirection::Vertical);

        assert!(repo.create_tripwire(42, &wire).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn tripwires_keep_insertion_order_across_updates() -> Result<()> {
        let repo = InMemoryCameraRepository::new();
        let cam = camera(&repo, Some(1)).await;

        for name in ["a", "b", "c"] {
            let wire = NewTripwire::new(name, 0.2, TripwireDirection::Horizontal);
            repo.create_tripwire(cam.camera_id, &wire).await?;
        }
        let update = TripwireUpdate {
            name: Some("b2".to_string()),
            ..TripwireUpdate::default()
        };
        let ids: Vec<_> = repo
            .get_camera_tripwires(cam.camera_id)
            .await?
            .iter()
            .map(|t| t.id)
            .collect();
        repo.update_tripwire(ids[1], &update).await?;

        let names: Vec<String> = repo
            .get_camera_tripwires(cam.camera_id)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a", "b2", "c"]);
        Ok(())
    }
}
