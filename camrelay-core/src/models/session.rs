use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::camera::{CameraDevice, DeviceEndpoint};
use crate::error::{Error, Result};

/// Body of a connect request as sent by the browser.
///
/// `ip` and `rtspPath` are accepted as aliases for `host` and `controlPath`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default, alias = "ip")]
    pub host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "rtspPath")]
    pub control_path: Option<String>,
}

impl ConnectRequest {
    /// Check required fields and fill in the default control path.
    ///
    /// Empty strings count as missing.
    pub fn into_params(self, default_control_path: &str) -> Result<ConnectionParams> {
        let present = |value: Option<String>| value.filter(|v| !v.is_empty());

        match (
            present(self.host),
            present(self.username),
            present(self.password),
        ) {
            (Some(host), Some(username), Some(password)) => Ok(ConnectionParams {
                host,
                username,
                password,
                control_path: present(self.control_path)
                    .unwrap_or_else(|| default_control_path.to_string()),
            }),
            _ => Err(Error::Validation(
                "IP, username, and password are required.".to_string(),
            )),
        }
    }
}

/// Validated parameters a session was established with.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub username: String,
    pub password: String,
    pub control_path: String,
}

impl ConnectionParams {
    #[must_use]
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("control_path", &self.control_path)
            .finish()
    }
}

/// The single live camera session.
///
/// Installing a new session replaces every field at once; nothing is ever
/// patched in place.
#[derive(Clone)]
pub struct CameraSession {
    pub device: Arc<dyn CameraDevice>,
    pub profile_token: Option<String>,
    pub source_url: String,
    pub params: ConnectionParams,
}

impl CameraSession {
    /// Source URL with the password masked, for logs.
    #[must_use]
    pub fn redacted_source_url(&self) -> String {
        redact_url(&self.source_url)
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("profile_token", &self.profile_token)
            .field("source_url", &self.redacted_source_url())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// What a successful connect reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOutcome {
    pub source_url: String,
    pub profile_token: Option<String>,
}

/// Mask the password component of a URL.
#[must_use]
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
