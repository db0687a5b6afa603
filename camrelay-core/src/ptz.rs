//! Directional/zoom requests to PTZ motion commands.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::camera::{PanTilt, Velocity};
use crate::error::{Error, Result};
use crate::metrics;
use crate::stream::CoordinatorHandle;

/// How long a continuous move runs before the camera halts on its own.
pub const MOVE_TIMEOUT: Duration = Duration::from_secs(1);

const NOT_CONNECTED: &str = "Camera is not connected.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PtzCommand {
    Stop { pan_tilt: bool, zoom: bool },
    ContinuousMove { velocity: Velocity, timeout: Duration },
}

impl PtzCommand {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stop { .. } => "stop",
            Self::ContinuousMove { .. } => "continuous_move",
        }
    }
}

const fn default_speed() -> f64 {
    0.5
}

/// Move request as sent by the browser. Every field is optional.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PtzRequest {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

impl Default for PtzRequest {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            speed: default_speed(),
        }
    }
}

impl PtzRequest {
    #[must_use]
    pub fn command(&self) -> PtzCommand {
        translate(self.x, self.y, self.z, self.speed)
    }
}

/// All-zero input stops both axes regardless of `speed`; anything else is a
/// continuous move carrying only the components that are non-zero, scaled by
/// `speed`.
#[must_use]
pub fn translate(x: f64, y: f64, z: f64, speed: f64) -> PtzCommand {
    if x == 0.0 && y == 0.0 && z == 0.0 {
        return PtzCommand::Stop {
            pan_tilt: true,
            zoom: true,
        };
    }

    let pan_tilt = (x != 0.0 || y != 0.0).then(|| PanTilt {
        x: x * speed,
        y: y * speed,
    });
    let zoom = (z != 0.0).then(|| z * speed);

    PtzCommand::ContinuousMove {
        velocity: Velocity { pan_tilt, zoom },
        timeout: MOVE_TIMEOUT,
    }
}

/// Sends translated commands to the device of the current session.
#[derive(Debug, Clone)]
pub struct PtzController {
    coordinator: CoordinatorHandle,
}

impl PtzController {
    #[must_use]
    pub const fn new(coordinator: CoordinatorHandle) -> Self {
        Self { coordinator }
    }

    /// Issue one command and return once the camera has accepted it.
    pub async fn move_camera(&self, request: PtzRequest) -> Result<PtzCommand> {
        let session = self
            .coordinator
            .session()
            .await?
            .ok_or_else(|| Error::NotConnected(NOT_CONNECTED.to_string()))?;
        let profile_token = session
            .profile_token
            .as_deref()
            .ok_or_else(|| Error::NotConnected(NOT_CONNECTED.to_string()))?;

        let command = request.command();
        debug!(?command, "Sending PTZ command");
        let sent = match &command {
            PtzCommand::Stop { pan_tilt, zoom } => {
                session.device.stop(profile_token, *pan_tilt, *zoom).await
            }
            PtzCommand::ContinuousMove { velocity, timeout } => {
                session
                    .device
                    .continuous_move(profile_token, velocity, *timeout)
                    .await
            }
        };

        sent.map_err(|e| {
            warn!(error = %e, kind = command.kind(), "PTZ command rejected");
            Error::Device(e.to_string())
        })?;
        metrics::PTZ_COMMANDS
            .with_label_values(&[command.kind()])
            .inc();
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::DeviceError;
    use crate::config::StreamConfig;
    use crate::models::CameraSession;
    use crate::stream::StreamCoordinator;
    use crate::test_helpers::{test_params, DeviceCall, FakeDevice, FakeLauncher};
    use std::sync::Arc;

    #[test]
    fn test_zero_input_stops_for_any_speed() {
        for speed in [0.0, 0.5, 1.0, -3.0] {
            assert_eq!(
                translate(0.0, 0.0, 0.0, speed),
                PtzCommand::Stop {
                    pan_tilt: true,
                    zoom: true
                }
            );
        }
    }

    #[test]
    fn test_full_move() {
        assert_eq!(
            translate(1.0, -1.0, 1.0, 0.5),
            PtzCommand::ContinuousMove {
                velocity: Velocity {
                    pan_tilt: Some(PanTilt { x: 0.5, y: -0.5 }),
                    zoom: Some(0.5),
                },
                timeout: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn test_only_present_components() {
        let PtzCommand::ContinuousMove { velocity, .. } = translate(0.0, 0.0, -1.0, 0.25) else {
            panic!("expected a move");
        };
        assert_eq!(velocity.pan_tilt, None);
        assert_eq!(velocity.zoom, Some(-0.25));

        let PtzCommand::ContinuousMove { velocity, .. } = translate(0.0, 1.0, 0.0, 1.0) else {
            panic!("expected a move");
        };
        assert_eq!(velocity.pan_tilt, Some(PanTilt { x: 0.0, y: 1.0 }));
        assert_eq!(velocity.zoom, None);
    }

    #[test]
    fn test_request_defaults() {
        let request: PtzRequest = serde_json::from_str(r#"{"x": 1}"#).unwrap();
        assert_eq!(request.speed, 0.5);
        assert_eq!(request.y, 0.0);
        assert_eq!(
            serde_json::from_str::<PtzRequest>("{}").unwrap().command(),
            PtzCommand::Stop {
                pan_tilt: true,
                zoom: true
            }
        );
    }

    async fn controller_with(device: Option<Arc<FakeDevice>>) -> PtzController {
        let (coordinator, _task) =
            StreamCoordinator::spawn(Arc::new(FakeLauncher::default()), &StreamConfig::default());
        if let Some(device) = device {
            coordinator
                .install_session(CameraSession {
                    device,
                    profile_token: Some("Profile_1".to_string()),
                    source_url: "rtsp://cam/live".to_string(),
                    params: test_params("10.0.0.5"),
                })
                .await
                .unwrap();
        }
        PtzController::new(coordinator)
    }

    #[tokio::test]
    async fn test_move_requires_session() {
        let controller = controller_with(None).await;
        let err = controller
            .move_camera(PtzRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
        assert_eq!(err.to_string(), "Camera is not connected.");
    }

    #[tokio::test]
    async fn test_move_issues_exactly_one_command() {
        let device = Arc::new(FakeDevice::new("Profile_1"));
        let controller = controller_with(Some(device.clone())).await;

        let request = PtzRequest {
            x: -1.0,
            speed: 1.0,
            ..PtzRequest::default()
        };
        controller.move_camera(request).await.unwrap();

        assert_eq!(
            device.calls(),
            vec![DeviceCall::ContinuousMove {
                profile_token: "Profile_1".to_string(),
                velocity: Velocity {
                    pan_tilt: Some(PanTilt { x: -1.0, y: 0.0 }),
                    zoom: None,
                },
                timeout: MOVE_TIMEOUT,
            }]
        );
    }

    #[tokio::test]
    async fn test_device_failure_is_passed_through() {
        let device = Arc::new(
            FakeDevice::new("Profile_1")
                .failing_with(DeviceError::Fault("PTZ not supported".to_string())),
        );
        let controller = controller_with(Some(device)).await;

        let err = controller
            .move_camera(PtzRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Device(_)));
        assert_eq!(err.to_string(), "PTZ not supported");
    }
}
