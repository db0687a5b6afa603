// In-process camera and transcoder stand-ins for router tests

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use camrelay_core::camera::{CameraDevice, DeviceConnector, DeviceEndpoint, DeviceError, Velocity};
use camrelay_core::config::{FallbackSourceConfig, StreamConfig};
use camrelay_core::ptz::PtzController;
use camrelay_core::session::CameraSessionManager;
use camrelay_core::stream::{
    StreamCoordinator, TranscoderError, TranscoderLauncher, TranscoderSink,
};

use crate::http::AppState;

/// Accepts moves, rejects stops.
pub struct TestDevice;

#[async_trait]
impl CameraDevice for TestDevice {
    fn profile_token(&self) -> Option<String> {
        Some("Profile_1".to_string())
    }

    async fn continuous_move(
        &self,
        _profile_token: &str,
        _velocity: &Velocity,
        _timeout: Duration,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn stop(
        &self,
        _profile_token: &str,
        _pan_tilt: bool,
        _zoom: bool,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Fault("Stop not supported".to_string()))
    }
}

/// Fails for the host `unreachable`, connects everywhere else.
pub struct TestConnector;

#[async_trait]
impl DeviceConnector for TestConnector {
    async fn connect(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Arc<dyn CameraDevice>, DeviceError> {
        if endpoint.host == "unreachable" {
            return Err(DeviceError::Transport("connect EHOSTUNREACH".to_string()));
        }
        Ok(Arc::new(TestDevice))
    }
}

/// Keeps the sink of every launch so tests can play the process.
#[derive(Default)]
pub struct RecordingLauncher {
    sinks: Mutex<Vec<TranscoderSink>>,
}

impl RecordingLauncher {
    pub fn last_sink(&self) -> Option<TranscoderSink> {
        self.sinks.lock().unwrap().last().cloned()
    }
}

impl TranscoderLauncher for RecordingLauncher {
    fn launch(
        &self,
        _source_url: &str,
        sink: TranscoderSink,
        _stop: CancellationToken,
    ) -> Result<(), TranscoderError> {
        self.sinks.lock().unwrap().push(sink);
        Ok(())
    }
}

pub fn test_state() -> (AppState, Arc<RecordingLauncher>) {
    let launcher = Arc::new(RecordingLauncher::default());
    let (coordinator, _task) =
        StreamCoordinator::spawn(launcher.clone(), &StreamConfig::default());
    let state = AppState {
        sessions: CameraSessionManager::new(
            Arc::new(TestConnector),
            coordinator.clone(),
            FallbackSourceConfig::default(),
        ),
        ptz: PtzController::new(coordinator.clone()),
        coordinator,
    };
    (state, launcher)
}
