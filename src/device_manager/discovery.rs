use crate::config::DiscoveryConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use onvif::discovery;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

/// Slack given to a scanner beyond its own deadline before the scan is abandoned
const SCAN_GRACE: Duration = Duration::from_secs(2);

/// Device reported by a network scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub ip_address: String,
    pub port: u16,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub stream_urls: Vec<String>,
    pub onvif_supported: bool,
    pub device_service_url: Option<String>,
    pub media_service_url: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(ip_address: impl Into<String>, port: u16) -> Self {
        Self {
            ip_address: ip_address.into(),
            port,
            manufacturer: None,
            model: None,
            firmware_version: None,
            stream_urls: Vec::new(),
            onvif_supported: false,
            device_service_url: None,
            media_service_url: None,
        }
    }
}

/// IPv4 network in CIDR notation, e.g. `192.168.1.0/24`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkRange {
    network: Ipv4Addr,
    prefix: u8,
}

impl NetworkRange {
    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            !((1u32 << (32 - self.prefix)) - 1)
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = self.mask();
        (u32::from(ip) & mask) == (u32::from(self.network) & mask)
    }

    /// `false` for anything that is not an IPv4 address
    pub fn contains_str(&self, ip: &str) -> bool {
        ip.parse::<Ipv4Addr>().is_ok_and(|ip| self.contains(ip))
    }
}

impl FromStr for NetworkRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Validation(format!("Invalid network range: {}", s));

        let (network, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let network = network.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix = match prefix.parse::<u8>() {
            Ok(p) if p <= 32 => p,
            _ => return Err(invalid()),
        };

        Ok(Self { network, prefix })
    }
}

impl fmt::Display for NetworkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Source of discovered devices
#[async_trait]
pub trait DeviceScanner: Send + Sync {
    /// Scan for devices, returning what was found within `timeout`
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>>;
}

/// WS-Discovery probe for ONVIF devices. Collects replies until the timeout.
#[derive(Debug, Default)]
pub struct OnvifScanner;

fn device_from_probe(device: &discovery::Device) -> Option<DiscoveredDevice> {
    let url: &Url = device.urls.first()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default().unwrap_or(80);

    let mut discovered = DiscoveredDevice::new(host, port);
    discovered.model = device.name.clone();
    discovered.onvif_supported = true;
    discovered.device_service_url = Some(url.to_string());
    Some(discovered)
}

#[async_trait]
impl DeviceScanner for OnvifScanner {
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        info!("Starting ONVIF camera discovery on the network");

        let probes: Vec<discovery::Device> = discovery::DiscoveryBuilder::default()
            .run()
            .await?
            .take_until(tokio::time::sleep(timeout))
            .collect()
            .await;

        info!("Found {} potential ONVIF devices", probes.len());

        let mut devices: Vec<DiscoveredDevice> = Vec::with_capacity(probes.len());
        for probe in &probes {
            match device_from_probe(probe) {
                Some(device) if devices.iter().all(|d| d.ip_address != device.ip_address) => {
                    devices.push(device)
                }
                Some(_) => {}
                None => debug!("Ignoring ONVIF reply without a usable address: {:?}", probe.urls),
            }
        }

        Ok(devices)
    }
}

/// Discovery request as accepted by the API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryRequest {
    pub network_range: Option<String>,
    /// Seconds; clamped to the configured maximum
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub devices: Vec<DiscoveredDevice>,
    pub elapsed: Duration,
    pub timeout: Duration,
    pub network_range: Option<NetworkRange>,
}

/// Runs scans with a hard timeout ceiling and a cap on concurrent scans
pub struct DiscoveryService {
    scanner: Arc<dyn DeviceScanner>,
    config: DiscoveryConfig,
    permits: Arc<Semaphore>,
}

impl DiscoveryService {
    pub fn new(scanner: Arc<dyn DeviceScanner>, config: DiscoveryConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_scans.max(1)));
        Self {
            scanner,
            config,
            permits,
        }
    }

    /// Requested timeout bounded by `max_timeout_secs`
    pub fn effective_timeout(&self, requested: Option<u64>) -> Duration {
        let secs = requested
            .unwrap_or(self.config.default_timeout_secs)
            .min(self.config.max_timeout_secs);
        Duration::from_secs(secs)
    }

    pub async fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryResult> {
        let network_range = request
            .network_range
            .as_deref()
            .map(str::parse::<NetworkRange>)
            .transpose()?;
        let timeout = self.effective_timeout(request.timeout);

        let _permit = match tokio::time::timeout(timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::Internal("Discovery service closed".to_string()).into()),
            Err(_) => {
                warn!("Discovery request timed out waiting for a scan slot");
                return Err(Error::Unavailable(
                    "Too many discovery scans in progress".to_string(),
                )
                .into());
            }
        };

        let started = Instant::now();
        let scanned = tokio::time::timeout(timeout + SCAN_GRACE, self.scanner.scan(timeout))
            .await
            .map_err(|_| {
                Error::Discovery(format!(
                    "Scan did not finish within {} seconds",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Discovery(e.to_string()))?;
        let elapsed = started.elapsed();

        let devices: Vec<DiscoveredDevice> = match &network_range {
            Some(range) => scanned
                .into_iter()
                .filter(|d| range.contains_str(&d.ip_address))
                .collect(),
            None => scanned,
        };

        info!(
            "Discovery finished in {:.2}s with {} cameras",
            elapsed.as_secs_f64(),
            devices.len()
        );

        Ok(DiscoveryResult {
            devices,
            elapsed,
            timeout,
            network_range,
        })
    }
}
