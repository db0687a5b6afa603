//! ONVIF device client over SOAP/HTTP.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::device::{CameraDevice, DeviceConnector, DeviceEndpoint, DeviceError, Velocity};
use super::{soap, xml};
use crate::config::CameraConfig;

const GET_CAPABILITIES: &str =
    "<tds:GetCapabilities><tds:Category>All</tds:Category></tds:GetCapabilities>";
const GET_PROFILES: &str = "<trt:GetProfiles/>";

/// Performs the ONVIF handshake against `http://{host}{device_service_path}`.
#[derive(Clone)]
pub struct OnvifConnector {
    http: reqwest::Client,
    device_service_path: String,
}

impl OnvifConnector {
    pub fn new(config: &CameraConfig) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DeviceError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            device_service_path: config.device_service_path.clone(),
        })
    }
}

#[async_trait]
impl DeviceConnector for OnvifConnector {
    async fn connect(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Arc<dyn CameraDevice>, DeviceError> {
        let device_url = format!("http://{}{}", endpoint.host, self.device_service_path);
        let client = SoapClient {
            http: self.http.clone(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
        };

        let capabilities = client.call(&device_url, GET_CAPABILITIES).await?;
        let media_url = service_address(&capabilities, "Media").unwrap_or_else(|| {
            debug!(host = %endpoint.host, "No media service advertised, using device service");
            device_url.clone()
        });
        let ptz_url = service_address(&capabilities, "PTZ");

        let profiles = client.call(&media_url, GET_PROFILES).await?;
        let profile_token = xml::element_attribute(&profiles, "Profiles", "token");
        if profile_token.is_none() {
            warn!(host = %endpoint.host, "Camera reported no media profiles");
        }

        let stream_uri = match &profile_token {
            Some(token) => match client.call(&media_url, &get_stream_uri(token)).await {
                Ok(body) => xml::element_text(&body, "Uri"),
                Err(e) => {
                    debug!(host = %endpoint.host, error = %e, "GetStreamUri failed");
                    None
                }
            },
            None => None,
        };

        info!(
            host = %endpoint.host,
            profile_token = ?profile_token,
            ptz = ptz_url.is_some(),
            reports_stream_uri = stream_uri.is_some(),
            "ONVIF handshake completed"
        );

        Ok(Arc::new(OnvifDevice {
            client,
            ptz_url,
            profile_token,
            stream_uri,
        }))
    }
}

fn service_address(capabilities: &str, service: &str) -> Option<String> {
    xml::section(capabilities, service).and_then(|s| xml::element_text(s, "XAddr"))
}

fn get_stream_uri(profile_token: &str) -> String {
    format!(
        concat!(
            "<trt:GetStreamUri><trt:StreamSetup>",
            "<tt:Stream>RTP-Unicast</tt:Stream>",
            "<tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport>",
            "</trt:StreamSetup><trt:ProfileToken>{}</trt:ProfileToken></trt:GetStreamUri>"
        ),
        xml::escape(profile_token)
    )
}

#[derive(Clone)]
struct SoapClient {
    http: reqwest::Client,
    username: String,
    password: String,
}

impl SoapClient {
    async fn call(&self, url: &str, body: &str) -> Result<String, DeviceError> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, soap::CONTENT_TYPE)
            .body(soap::envelope(&self.username, &self.password, body))
            .send()
            .await
            .map_err(|e| DeviceError::Transport(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeviceError::Transport(format!("Failed to read response: {e}")))?;

        if let Some(reason) = soap::fault_reason(&text) {
            return Err(DeviceError::Fault(reason));
        }
        if !status.is_success() {
            return Err(DeviceError::Fault(format!(
                "Device responded with status {status}"
            )));
        }
        if xml::section(&text, "Body").is_none() {
            return Err(DeviceError::Protocol(
                "Device response is not a SOAP envelope".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Handle on a camera that completed the ONVIF handshake.
pub struct OnvifDevice {
    client: SoapClient,
    ptz_url: Option<String>,
    profile_token: Option<String>,
    stream_uri: Option<String>,
}

impl OnvifDevice {
    fn ptz_url(&self) -> Result<&str, DeviceError> {
        self.ptz_url.as_deref().ok_or_else(|| {
            DeviceError::Unsupported("Camera does not expose a PTZ service".to_string())
        })
    }
}

#[async_trait]
impl CameraDevice for OnvifDevice {
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
        let mut components = String::new();
        if let Some(pan_tilt) = velocity.pan_tilt {
            components.push_str(&format!(
                r#"<tt:PanTilt x="{}" y="{}"/>"#,
                pan_tilt.x, pan_tilt.y
            ));
        }
        if let Some(zoom) = velocity.zoom {
            components.push_str(&format!(r#"<tt:Zoom x="{zoom}"/>"#));
        }
        let body = format!(
            concat!(
                "<tptz:ContinuousMove><tptz:ProfileToken>{}</tptz:ProfileToken>",
                "<tptz:Velocity>{}</tptz:Velocity>",
                "<tptz:Timeout>{}</tptz:Timeout></tptz:ContinuousMove>"
            ),
            xml::escape(profile_token),
            components,
            soap::xs_duration(timeout)
        );
        self.client.call(self.ptz_url()?, &body).await.map(|_| ())
    }

    async fn stop(
        &self,
        profile_token: &str,
        pan_tilt: bool,
        zoom: bool,
    ) -> Result<(), DeviceError> {
        let body = format!(
            concat!(
                "<tptz:Stop><tptz:ProfileToken>{}</tptz:ProfileToken>",
                "<tptz:PanTilt>{}</tptz:PanTilt><tptz:Zoom>{}</tptz:Zoom></tptz:Stop>"
            ),
            xml::escape(profile_token),
            pan_tilt,
            zoom
        );
        self.client.call(self.ptz_url()?, &body).await.map(|_| ())
    }
}
