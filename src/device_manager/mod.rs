pub mod discovery;

pub use discovery::{DeviceScanner, DiscoveredDevice, DiscoveryService, OnvifScanner};
