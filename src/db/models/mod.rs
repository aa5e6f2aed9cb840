pub mod camera_models;
pub mod tripwire_models;

pub use camera_models::{
    CameraId, CameraRecord, CameraStatus, CameraType, CameraUpdate, CameraWithTripwires,
    ConfigureCamera, NewCamera,
};
pub use tripwire_models::{
    DetectionType, NewTripwire, TripwireDirection, TripwireId, TripwireRecord, TripwireUpdate,
    DEFAULT_TRIPWIRE_SPACING,
};
