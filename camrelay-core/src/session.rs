//! Camera session establishment.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use crate::camera::DeviceConnector;
use crate::config::FallbackSourceConfig;
use crate::error::{Error, Result};
use crate::models::{CameraSession, ConnectOutcome, ConnectRequest, ConnectionParams};
use crate::stream::CoordinatorHandle;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Clone)]
pub struct CameraSessionManager {
    connector: Arc<dyn DeviceConnector>,
    coordinator: CoordinatorHandle,
    fallback: FallbackSourceConfig,
    connect_lock: Arc<Mutex<()>>,
}

impl CameraSessionManager {
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        coordinator: CoordinatorHandle,
        fallback: FallbackSourceConfig,
    ) -> Self {
        Self {
            connector,
            coordinator,
            fallback,
            connect_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Validate `request`, run the handshake and install the new session.
    ///
    /// Any running stream is stopped before the handshake starts. On failure
    /// the previous session stays in place.
    pub async fn connect(&self, request: ConnectRequest) -> Result<ConnectOutcome> {
        let params = request.into_params(&self.fallback.default_path)?;

        // Runs detached so a caller going away mid-handshake cannot leave the
        // stream suspended.
        let manager = self.clone();
        tokio::spawn(async move { manager.establish(params).await })
            .await
            .map_err(|e| Error::Internal(format!("Connect task failed: {e}")))?
    }

    async fn establish(&self, params: ConnectionParams) -> Result<ConnectOutcome> {
        let _guard = self.connect_lock.lock().await;
        self.coordinator.begin_reconnect().await?;

        info!(host = %params.host, username = %params.username, "Connecting to camera");
        let device = match self.connector.connect(&params.endpoint()).await {
            Ok(device) => device,
            Err(e) => {
                warn!(host = %params.host, error = %e, "Camera handshake failed");
                self.coordinator.abort_reconnect().await?;
                return Err(Error::Connect(e.to_string()));
            }
        };

        let profile_token = device.profile_token();
        let source_url = resolve_source_url(device.stream_uri().as_deref(), &params, &self.fallback);
        let session = CameraSession {
            device,
            profile_token: profile_token.clone(),
            source_url: source_url.clone(),
            params,
        };
        self.coordinator.install_session(session).await?;

        Ok(ConnectOutcome {
            source_url,
            profile_token,
        })
    }
}

/// Source URL for a session: the device-reported address with credentials
/// added when it has none, otherwise the configured fallback layout.
#[must_use]
pub fn resolve_source_url(
    stream_uri: Option<&str>,
    params: &ConnectionParams,
    fallback: &FallbackSourceConfig,
) -> String {
    match stream_uri.filter(|uri| !uri.is_empty()) {
        Some(uri) => with_credentials(uri, params),
        None => fallback_source_url(params, fallback),
    }
}

/// Add the session credentials to `uri` unless it already carries a user.
#[must_use]
pub fn with_credentials(uri: &str, params: &ConnectionParams) -> String {
    let Ok(mut url) = Url::parse(uri) else {
        return uri.to_string();
    };
    if !url.username().is_empty() {
        return uri.to_string();
    }
    if url.set_username(&params.username).is_err()
        || url.set_password(Some(&params.password)).is_err()
    {
        return uri.to_string();
    }
    url.to_string()
}

/// `{scheme}://{user}:{password}@{host}[:{port}]{path}` with both credentials
/// escaped like a URI component.
#[must_use]
pub fn fallback_source_url(params: &ConnectionParams, fallback: &FallbackSourceConfig) -> String {
    let username = utf8_percent_encode(&params.username, URI_COMPONENT);
    let password = utf8_percent_encode(&params.password, URI_COMPONENT);
    let host = match fallback.port {
        Some(port) => format!("{}:{port}", strip_port(&params.host)),
        None => params.host.clone(),
    };
    let path = if params.control_path.starts_with('/') {
        params.control_path.clone()
    } else {
        format!("/{}", params.control_path)
    };
    format!("{}://{username}:{password}@{host}{path}", fallback.scheme)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    match host.rsplit_once(':') {
        Some((name, _)) if !name.contains(':') => name,
        _ => host,
    }
}
