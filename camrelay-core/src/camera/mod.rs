pub mod device;
pub mod onvif;
pub mod soap;
pub mod xml;

pub use device::{
    CameraDevice, DeviceConnector, DeviceEndpoint, DeviceError, PanTilt, Velocity,
};
pub use onvif::{OnvifConnector, OnvifDevice};
