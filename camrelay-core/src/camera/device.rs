//! Capability interface for the camera's device-control collaborator.
//!
//! A [`DeviceConnector`] performs the handshake and hands back a
//! [`CameraDevice`]. The required capabilities are the profile token and the
//! two motion primitives. Reporting a media source address is optional: a
//! device returning `None` from [`CameraDevice::stream_uri`] gets the
//! configured fallback URL layout instead.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The camera could not be reached.
    #[error("{0}")]
    Transport(String),

    /// The camera answered with a fault or an error status.
    #[error("{0}")]
    Fault(String),

    /// The camera answered with something we could not interpret.
    #[error("{0}")]
    Protocol(String),

    #[error("{0}")]
    Unsupported(String),
}

/// Where and as whom to reach the camera.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEndpoint")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Pan/tilt velocity, each axis in the device's normalized range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanTilt {
    pub x: f64,
    pub y: f64,
}

/// Velocity of a continuous move. Absent components are left untouched by
/// the device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    pub pan_tilt: Option<PanTilt>,
    pub zoom: Option<f64>,
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Token of the media profile motion commands address.
    fn profile_token(&self) -> Option<String>;

    /// Media source address reported by the device, if it reports one.
    fn stream_uri(&self) -> Option<String> {
        None
    }

    /// Start moving at `velocity`; the device halts by itself once `timeout`
    /// passes without a renewal.
    async fn continuous_move(
        &self,
        profile_token: &str,
        velocity: &Velocity,
        timeout: Duration,
    ) -> Result<(), DeviceError>;

    async fn stop(&self, profile_token: &str, pan_tilt: bool, zoom: bool)
        -> Result<(), DeviceError>;
}

#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Arc<dyn CameraDevice>, DeviceError>;
}
