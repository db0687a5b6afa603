//! In-process fakes for the camera and transcoder collaborators.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::camera::{CameraDevice, DeviceConnector, DeviceEndpoint, DeviceError, Velocity};
use crate::models::{CameraSession, ConnectionParams};
use crate::stream::{TranscoderError, TranscoderLauncher, TranscoderSink};

/// A device command recorded by [`FakeDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    ContinuousMove {
        profile_token: String,
        velocity: Velocity,
        timeout: Duration,
    },
    Stop {
        profile_token: String,
        pan_tilt: bool,
        zoom: bool,
    },
}

#[derive(Default)]
pub struct FakeDevice {
    profile_token: Option<String>,
    stream_uri: Option<String>,
    failure: Option<DeviceError>,
    calls: Mutex<Vec<DeviceCall>>,
}

impl FakeDevice {
    pub fn new(profile_token: &str) -> Self {
        Self {
            profile_token: Some(profile_token.to_string()),
            ..Self::default()
        }
    }

    pub fn with_stream_uri(mut self, uri: &str) -> Self {
        self.stream_uri = Some(uri.to_string());
        self
    }

    pub fn failing_with(mut self, error: DeviceError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: DeviceCall) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(call);
        self.failure.clone().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl CameraDevice for FakeDevice {
    fn profile_token(&self) -> Option<String> {
        self.profile_token.clone()
    }

    fn stream_uri(&self) -> Option<String> {
        self.stream_uri.clone()
    }

    async fn continuous_move(
        &self,
        profile_token: &str,
        velocity: &Velocity,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::ContinuousMove {
            profile_token: profile_token.to_string(),
            velocity: *velocity,
            timeout,
        })
    }

    async fn stop(&self, profile_token: &str, pan_tilt: bool, zoom: bool) -> Result<(), DeviceError> {
        self.record(DeviceCall::Stop {
            profile_token: profile_token.to_string(),
            pan_tilt,
            zoom,
        })
    }
}

/// Connector that hands out queued outcomes in order.
#[derive(Default)]
pub struct FakeConnector {
    outcomes: Mutex<VecDeque<Result<Arc<FakeDevice>, DeviceError>>>,
    endpoints: Mutex<Vec<DeviceEndpoint>>,
    gate: Option<Arc<Notify>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every handshake until `gate` is notified.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn push_device(&self, device: Arc<FakeDevice>) {
        self.outcomes.lock().unwrap().push_back(Ok(device));
    }

    pub fn push_failure(&self, error: DeviceError) {
        self.outcomes.lock().unwrap().push_back(Err(error));
    }

    pub fn endpoints(&self) -> Vec<DeviceEndpoint> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceConnector for FakeConnector {
    async fn connect(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Arc<dyn CameraDevice>, DeviceError> {
        self.endpoints.lock().unwrap().push(endpoint.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(DeviceError::Transport("connect ECONNREFUSED".to_string())));
        outcome.map(|device| device as Arc<dyn CameraDevice>)
    }
}

struct Launch {
    source_url: String,
    sink: TranscoderSink,
    stop: CancellationToken,
}

/// Launcher that records launches instead of starting processes.
#[derive(Default)]
pub struct FakeLauncher {
    launches: Mutex<Vec<Launch>>,
    fail_spawn: AtomicBool,
}

impl FakeLauncher {
    pub fn failing() -> Self {
        let launcher = Self::default();
        launcher.fail_spawn.store(true, Ordering::SeqCst);
        launcher
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn launched(&self) -> Vec<String> {
        self.launches
            .lock()
            .unwrap()
            .iter()
            .map(|l| l.source_url.clone())
            .collect()
    }

    pub fn last_sink(&self) -> Option<TranscoderSink> {
        self.launches.lock().unwrap().last().map(|l| l.sink.clone())
    }

    pub fn last_stop(&self) -> Option<CancellationToken> {
        self.launches.lock().unwrap().last().map(|l| l.stop.clone())
    }
}

impl TranscoderLauncher for FakeLauncher {
    fn launch(
        &self,
        source_url: &str,
        sink: TranscoderSink,
        stop: CancellationToken,
    ) -> Result<(), TranscoderError> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(TranscoderError::Spawn {
                binary: "ffmpeg".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        self.launches.lock().unwrap().push(Launch {
            source_url: source_url.to_string(),
            sink,
            stop,
        });
        Ok(())
    }
}

pub fn test_params(host: &str) -> ConnectionParams {
    ConnectionParams {
        host: host.to_string(),
        username: "admin".to_string(),
        password: "secret".to_string(),
        control_path: "/Streaming/Channels/101".to_string(),
    }
}

/// Session backed by a [`FakeDevice`] with profile token `Profile_1`.
pub fn test_session(source_url: &str) -> CameraSession {
    CameraSession {
        device: Arc::new(FakeDevice::new("Profile_1")),
        profile_token: Some("Profile_1".to_string()),
        source_url: source_url.to_string(),
        params: test_params("10.0.0.5"),
    }
}
