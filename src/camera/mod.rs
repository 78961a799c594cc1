pub mod decoder;
pub mod options;
pub mod permission;
pub mod zbar;

pub use decoder::{DecodeCallbacks, Decoder};
pub use options::{CameraConstraints, RegionOfInterest, SamplingConfig};
pub use permission::{CameraPermission, DevicePermission, PermissionSubscription};
pub use zbar::ZbarDecoder;
