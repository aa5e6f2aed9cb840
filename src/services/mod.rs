pub mod assembler;
pub mod camera_manager;
pub mod ingestion;
pub mod reload;
pub mod validator;

pub use assembler::ConfigurationAssembler;
pub use camera_manager::CameraManager;
pub use ingestion::DiscoveryIngestion;
pub use reload::{EngineHandle, ReloadCoordinator, TrackingEngine};
pub use validator::ConfigurationValidator;
