pub mod api;
pub mod config;
pub mod db;
pub mod device_manager;
pub mod error;
pub mod security;
pub mod services;

// Re-export main components for easier use
pub use error::Error;
pub use services::{
    CameraManager, ConfigurationAssembler, ConfigurationValidator, DiscoveryIngestion,
    EngineHandle, ReloadCoordinator, TrackingEngine,
};
