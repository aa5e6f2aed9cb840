use crate::config::{DedupPolicy, IngestionConfig};
use crate::db::models::{CameraId, CameraStatus, NewCamera};
use crate::db::repositories::CameraRepository;
use crate::device_manager::discovery::DiscoveredDevice;
use crate::error::Error;
use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionFailure {
    pub ip_address: String,
    pub reason: String,
}

/// Outcome of persisting one batch of discovered devices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionReport {
    pub job_id: Uuid,
    pub stored: Vec<CameraId>,
    pub skipped_duplicates: usize,
    pub failures: Vec<IngestionFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestionJobState {
    Pending,
    Completed { report: IngestionReport },
}

/// Handle returned for an accepted batch
#[derive(Debug)]
pub struct IngestionTicket {
    pub job_id: Uuid,
    pub ack: oneshot::Receiver<IngestionReport>,
}

struct IngestionJob {
    job_id: Uuid,
    devices: Vec<DiscoveredDevice>,
    ack: oneshot::Sender<IngestionReport>,
}

/// Job states, oldest first, trimmed to the retention limit
struct JobLedger {
    states: HashMap<Uuid, IngestionJobState>,
    order: VecDeque<Uuid>,
    retention: usize,
}

impl JobLedger {
    fn new(retention: usize) -> Self {
        Self {
            states: HashMap::new(),
            order: VecDeque::new(),
            retention: retention.max(1),
        }
    }

    fn insert(&mut self, job_id: Uuid, state: IngestionJobState) {
        if self.states.insert(job_id, state).is_none() {
            self.order.push_back(job_id);
        }
        while self.order.len() > self.retention {
            if let Some(expired) = self.order.pop_front() {
                self.states.remove(&expired);
            }
        }
    }

    fn discard(&mut self, job_id: Uuid) {
        self.states.remove(&job_id);
        self.order.retain(|id| *id != job_id);
    }
}

/// Candidate camera record for a discovered device
pub fn candidate_camera(device: &DiscoveredDevice) -> NewCamera {
    let label: Vec<&str> = [device.manufacturer.as_deref(), device.model.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
    let name = if label.is_empty() {
        format!("Camera {}", device.ip_address)
    } else {
        format!("{} ({})", label.join(" "), device.ip_address)
    };

    let mut camera = NewCamera::named(name);
    camera.ip_address = Some(device.ip_address.clone());
    camera.stream_url = device.stream_urls.first().cloned();
    camera.status = CameraStatus::Discovered;
    camera.is_active = false;
    camera.manufacturer = device.manufacturer.clone();
    camera.model = device.model.clone();
    camera.firmware_version = device.firmware_version.clone();
    camera.onvif_supported = device.onvif_supported;
    camera
}

/// Bounded queue persisting discovery results in the background.
///
/// A single worker drains the queue in submission order. Each job is
/// acknowledged with its [`IngestionReport`], which also stays queryable
/// until it ages out of the ledger.
pub struct DiscoveryIngestion {
    sender: mpsc::Sender<IngestionJob>,
    ledger: Arc<RwLock<JobLedger>>,
}

impl DiscoveryIngestion {
    /// Spawn the worker on the current tokio runtime. The worker exits once the
    /// service is dropped and the queue has drained.
    pub fn start(repository: Arc<dyn CameraRepository>, config: &IngestionConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let ledger = Arc::new(RwLock::new(JobLedger::new(config.report_retention)));

        tokio::spawn(run_worker(
            receiver,
            repository,
            config.dedup_policy,
            ledger.clone(),
        ));

        Self { sender, ledger }
    }

    /// Queue a batch. Fails with `Unavailable` when the queue is full.
    pub async fn submit(&self, devices: Vec<DiscoveredDevice>) -> Result<IngestionTicket> {
        let job_id = Uuid::new_v4();
        let (ack, ack_rx) = oneshot::channel();
        let count = devices.len();

        // Recorded before sending so the worker's completion cannot be overwritten
        self.ledger
            .write()
            .await
            .insert(job_id, IngestionJobState::Pending);

        let job = IngestionJob {
            job_id,
            devices,
            ack,
        };
        if let Err(e) = self.sender.try_send(job) {
            self.ledger.write().await.discard(job_id);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("Ingestion queue full, dropping {} discovered cameras", count);
                    Error::Unavailable("Ingestion queue is full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    Error::Internal("Ingestion worker has stopped".to_string())
                }
            }
            .into());
        }

        debug!("Queued ingestion job {} with {} devices", job_id, count);
        Ok(IngestionTicket {
            job_id,
            ack: ack_rx,
        })
    }

    pub async fn job_state(&self, job_id: Uuid) -> Option<IngestionJobState> {
        self.ledger.read().await.states.get(&job_id).cloned()
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<IngestionJob>,
    repository: Arc<dyn CameraRepository>,
    dedup_policy: DedupPolicy,
    ledger: Arc<RwLock<JobLedger>>,
) {
    while let Some(job) = receiver.recv().await {
        let report = persist(repository.as_ref(), dedup_policy, job.job_id, &job.devices).await;

        info!(
            "Stored {} discovered cameras (job {}, {} duplicates skipped, {} failed)",
            report.stored.len(),
            job.job_id,
            report.skipped_duplicates,
            report.failures.len()
        );

        ledger.write().await.insert(
            job.job_id,
            IngestionJobState::Completed {
                report: report.clone(),
            },
        );

        // The submitter may have stopped listening
        let _ = job.ack.send(report);
    }
    debug!("Ingestion worker stopped");
}

async fn persist(
    repository: &dyn CameraRepository,
    dedup_policy: DedupPolicy,
    job_id: Uuid,
    devices: &[DiscoveredDevice],
) -> IngestionReport {
    let mut report = IngestionReport {
        job_id,
        stored: Vec::new(),
        skipped_duplicates: 0,
        failures: Vec::new(),
    };

    for device in devices {
        match store_device(repository, dedup_policy, device).await {
            Ok(Some(camera_id)) => report.stored.push(camera_id),
            Ok(None) => report.skipped_duplicates += 1,
            Err(e) => {
                error!(
                    "Failed to store discovered camera {}: {}",
                    device.ip_address, e
                );
                report.failures.push(IngestionFailure {
                    ip_address: device.ip_address.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}

/// `None` when the device was skipped as a duplicate
async fn store_device(
    repository: &dyn CameraRepository,
    dedup_policy: DedupPolicy,
    device: &DiscoveredDevice,
) -> Result<Option<CameraId>> {
    if dedup_policy == DedupPolicy::IpAddress {
        if let Some(existing) = repository.find_by_ip(&device.ip_address).await? {
            debug!(
                "Skipping {}: already on record as camera {}",
                device.ip_address, existing.camera_id
            );
            return Ok(None);
        }
    }

    let camera = repository.create_camera(candidate_camera(device)).await?;
    Ok(Some(camera.camera_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        CameraRecord, CameraUpdate, NewTripwire, TripwireId, TripwireRecord, TripwireUpdate,
    };
    use crate::db::repositories::InMemoryCameraRepository;
    use async_trait::async_trait;

    fn config(dedup_policy: DedupPolicy, queue_capacity: usize) -> IngestionConfig {
        IngestionConfig {
            queue_capacity,
            dedup_policy,
            report_retention: 4,
        }
    }

    fn device(ip: &str) -> DiscoveredDevice {
        let mut device = DiscoveredDevice::new(ip, 80);
        device.manufacturer = Some("Acme".to_string());
        device.model = Some("X1".to_string());
        device.stream_urls = vec![format!("rtsp://{}/main", ip), format!("rtsp://{}/sub", ip)];
        device.onvif_supported = true;
        device
    }

    #[test]
    fn candidate_uses_metadata_and_first_stream() {
        let camera = candidate_camera(&device("10.0.0.8"));

        assert_eq!(camera.camera_name, "Acme X1 (10.0.0.8)");
        assert_eq!(camera.stream_url.as_deref(), Some("rtsp://10.0.0.8/main"));
        assert_eq!(camera.status, CameraStatus::Discovered);
        assert!(!camera.is_active);
        assert!(camera.onvif_supported);

        let bare = candidate_camera(&DiscoveredDevice::new("10.0.0.9", 80));
        assert_eq!(bare.camera_name, "Camera 10.0.0.9");
        assert!(bare.stream_url.is_none());
    }

    #[tokio::test]
    async fn stores_candidates_and_acknowledges() -> Result<()> {
        let repository = Arc::new(InMemoryCameraRepository::new());
        let ingestion = DiscoveryIngestion::start(repository.clone(), &config(DedupPolicy::None, 4));

        let ticket = ingestion
            .submit(vec![device("10.0.0.1"), device("10.0.0.2")])
            .await?;
        let report = ticket.ack.await?;

        assert_eq!(report.stored.len(), 2);
        assert!(report.failures.is_empty());
        let stored = repository.list_cameras_by_status(CameraStatus::Discovered).await?;
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|c| !c.is_active));
        assert_eq!(
            ingestion.job_state(ticket.job_id).await,
            Some(IngestionJobState::Completed { report })
        );
        Ok(())
    }

    #[tokio::test]
    async fn without_dedup_repeated_scans_duplicate_rows() -> Result<()> {
        let repository = Arc::new(InMemoryCameraRepository::new());
        let ingestion = DiscoveryIngestion::start(repository.clone(), &config(DedupPolicy::None, 4));

        ingestion.submit(vec![device("10.0.0.1")]).await?.ack.await?;
        ingestion.submit(vec![device("10.0.0.1")]).await?.ack.await?;

        assert_eq!(repository.list_cameras().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn ip_dedup_skips_known_addresses() -> Result<()> {
        let repository = Arc::new(InMemoryCameraRepository::new());
        let ingestion =
            DiscoveryIngestion::start(repository.clone(), &config(DedupPolicy::IpAddress, 4));

        ingestion.submit(vec![device("10.0.0.1")]).await?.ack.await?;
        let report = ingestion
            .submit(vec![device("10.0.0.1"), device("10.0.0.2"), device("10.0.0.2")])
            .await?
            .ack
            .await?;

        assert_eq!(report.stored.len(), 1);
        assert_eq!(report.skipped_duplicates, 2);
        assert_eq!(repository.list_cameras().await?.len(), 2);
        Ok(())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_queue_rejects_submission() -> Result<()> {
        let repository = Arc::new(InMemoryCameraRepository::new());
        let ingestion = DiscoveryIngestion::start(repository, &config(DedupPolicy::None, 1));

        // The worker cannot run until this task yields, so the first job stays queued
        let first = ingestion.submit(vec![device("10.0.0.1")]).await?;
        let err = ingestion.submit(vec![device("10.0.0.2")]).await.unwrap_err();

        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Unavailable(_))));
        assert!(first.ack.await?.stored.len() == 1);
        Ok(())
    }

    #[test]
    fn ledger_keeps_only_recent_jobs() {
        let mut ledger = JobLedger::new(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            ledger.insert(*id, IngestionJobState::Pending);
        }

        assert!(!ledger.states.contains_key(&ids[0]));
        assert!(ledger.states.contains_key(&ids[2]));
    }

    #[test]
    fn discarded_job_frees_its_retention_slot() {
        let mut ledger = JobLedger::new(2);
        let kept = Uuid::new_v4();
        let rejected = Uuid::new_v4();
        ledger.insert(kept, IngestionJobState::Pending);
        ledger.insert(rejected, IngestionJobState::Pending);

        ledger.discard(rejected);
        ledger.insert(Uuid::new_v4(), IngestionJobState::Pending);

        assert!(ledger.states.contains_key(&kept));
        assert_eq!(ledger.order.len(), 2);
        assert!(!ledger.order.contains(&rejected));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rejected_submission_leaves_no_ledger_entry() -> Result<()> {
        let repository = Arc::new(InMemoryCameraRepository::new());
        let ingestion = DiscoveryIngestion::start(repository, &config(DedupPolicy::None, 1));

        let first = ingestion.submit(vec![device("10.0.0.1")]).await?;
        assert!(ingestion.submit(vec![device("10.0.0.2")]).await.is_err());

        let ledger = ingestion.ledger.read().await;
        assert_eq!(ledger.order.len(), 1);
        assert_eq!(ledger.order.front(), Some(&first.job_id));
        Ok(())
    }

    /// Store that refuses to create one address and otherwise delegates
    struct RefusingRepository {
        inner: InMemoryCameraRepository,
        refused_ip: &'static str,
    }

    #[async_trait]
    impl CameraRepository for RefusingRepository {
        async fn create_camera(&self, camera: NewCamera) -> Result<CameraRecord> {
            if camera.ip_address.as_deref() == Some(self.refused_ip) {
                return Err(Error::Database("connection reset".to_string()).into());
            }
            self.inner.create_camera(camera).await
        }

        async fn get_camera(&self, camera_id: CameraId) -> Result<Option<CameraRecord>> {
            self.inner.get_camera(camera_id).await
        }

        async fn list_cameras(&self) -> Result<Vec<CameraRecord>> {
            self.inner.list_cameras().await
        }

        async fn list_active_cameras(&self) -> Result<Vec<CameraRecord>> {
            self.inner.list_active_cameras().await
        }

        async fn list_cameras_by_status(&self, status: CameraStatus) -> Result<Vec<CameraRecord>> {
            self.inner.list_cameras_by_status(status).await
        }

        async fn find_by_ip(&self, ip_address: &str) -> Result<Option<CameraRecord>> {
            self.inner.find_by_ip(ip_address).await
        }

        async fn update_camera(
            &self,
            camera_id: CameraId,
            update: &CameraUpdate,
        ) -> Result<Option<CameraRecord>> {
            self.inner.update_camera(camera_id, update).await
        }

        async fn set_active(&self, camera_id: CameraId, is_active: bool) -> Result<bool> {
            self.inner.set_active(camera_id, is_active).await
        }

        async fn delete_camera(&self, camera_id: CameraId) -> Result<bool> {
            self.inner.delete_camera(camera_id).await
        }

        async fn next_camera_id(&self) -> Result<CameraId> {
            self.inner.next_camera_id().await
        }

        async fn create_tripwire(
            &self,
            camera_id: CameraId,
            tripwire: &NewTripwire,
        ) -> Result<Option<TripwireRecord>> {
            self.inner.create_tripwire(camera_id, tripwire).await
        }

        async fn get_tripwire(&self, tripwire_id: TripwireId) -> Result<Option<TripwireRecord>> {
            self.inner.get_tripwire(tripwire_id).await
        }

        async fn get_camera_tripwires(&self, camera_id: CameraId) -> Result<Vec<TripwireRecord>> {
            self.inner.get_camera_tripwires(camera_id).await
        }

        async fn update_tripwire(
            &self,
            tripwire_id: TripwireId,
            update: &TripwireUpdate,
        ) -> Result<Option<TripwireRecord>> {
            self.inner.update_tripwire(tripwire_id, update).await
        }

        async fn delete_tripwire(&self, tripwire_id: TripwireId) -> Result<bool> {
            self.inner.delete_tripwire(tripwire_id).await
        }
    }

    #[tokio::test]
    async fn store_failure_is_reported_and_batch_continues() -> Result<()> {
        let repository = Arc::new(RefusingRepository {
            inner: InMemoryCameraRepository::new(),
            refused_ip: "10.0.0.2",
        });
        let ingestion = DiscoveryIngestion::start(repository.clone(), &config(DedupPolicy::None, 4));

        let ticket = ingestion
            .submit(vec![device("10.0.0.1"), device("10.0.0.2"), device("10.0.0.3")])
            .await?;
        let report = ticket.ack.await?;

        assert_eq!(report.stored.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].ip_address, "10.0.0.2");
        assert!(report.failures[0].reason.contains("connection reset"));

        let stored: Vec<String> = repository
            .list_cameras()
            .await?
            .into_iter()
            .filter_map(|c| c.ip_address)
            .collect();
        assert_eq!(stored, vec!["10.0.0.1", "10.0.0.3"]);
        assert!(matches!(
            ingestion.job_state(ticket.job_id).await,
            Some(IngestionJobState::Completed { .. })
        ));
        Ok(())
    }
}
