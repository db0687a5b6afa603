use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub transcoder: TranscoderConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Directory with the browser player; not served when unset.
    pub static_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 3000,
            static_dir: Some("public".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Path of the ONVIF device service on the camera.
    pub device_service_path: String,
    pub request_timeout_seconds: u64,
    pub fallback_source: FallbackSourceConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_service_path: "/onvif/device_service".to_string(),
            request_timeout_seconds: 10,
            fallback_source: FallbackSourceConfig::default(),
        }
    }
}

impl CameraConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// URL layout used to build the media source when the camera does not
/// report one: `{scheme}://{user}:{pass}@{host}[:{port}]{path}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSourceConfig {
    pub scheme: String,
    pub port: Option<u16>,
    /// Used when the connect request carries no control path.
    pub default_path: String,
}

impl Default for FallbackSourceConfig {
    fn default() -> Self {
        Self {
            scheme: "rtsp".to_string(),
            port: None,
            default_path: "/Streaming/Channels/101".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub binary: String,
    /// How long ffmpeg gets to quit after `q` before it is killed.
    pub stop_grace_millis: u64,
    pub read_chunk_bytes: usize,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            stop_grace_millis: 2000,
            read_chunk_bytes: 64 * 1024,
        }
    }
}

impl TranscoderConfig {
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Chunks buffered per viewer before it is considered too slow.
    pub viewer_queue_chunks: usize,
    /// Capacity of the coordinator mailboxes.
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            viewer_queue_chunks: 256,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or directive list, overridden by `RUST_LOG`.
    pub level: String,
    /// Level for ffmpeg's stderr; its lines are logged at debug.
    pub transcoder_level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            transcoder_level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // CAMRELAY_SERVER__HTTP_PORT, CAMRELAY_TRANSCODER__BINARY, ...
        builder = builder.add_source(
            Environment::with_prefix("CAMRELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Check the configuration and collect every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.transcoder.binary.trim().is_empty() {
            errors.push("transcoder.binary must not be empty".to_string());
        }
        if self.transcoder.read_chunk_bytes == 0 {
            errors.push("transcoder.read_chunk_bytes must be greater than 0".to_string());
        }
        if self.stream.viewer_queue_chunks == 0 {
            errors.push("stream.viewer_queue_chunks must be greater than 0".to_string());
        }
        if self.stream.event_buffer == 0 {
            errors.push("stream.event_buffer must be greater than 0".to_string());
        }
        if !self.camera.device_service_path.starts_with('/') {
            errors.push(format!(
                "camera.device_service_path must start with '/': {}",
                self.camera.device_service_path
            ));
        }
        if self.camera.fallback_source.scheme.trim().is_empty() {
            errors.push("camera.fallback_source.scheme must not be empty".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\": {}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.http_address(), "0.0.0.0:3000");
        assert_eq!(config.transcoder.binary, "ffmpeg");
        assert_eq!(
            config.camera.fallback_source.default_path,
            "/Streaming/Channels/101"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.transcoder.binary = String::new();
        config.stream.viewer_queue_chunks = 0;
        config.logging.format = "xml".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("transcoder.binary")));
        assert!(errors.iter().any(|e| e.contains("viewer_queue_chunks")));
        assert!(errors.iter().any(|e| e.contains("logging.format")));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.transcoder.stop_grace(), Duration::from_secs(2));
        assert_eq!(config.camera.request_timeout(), Duration::from_secs(10));
    }
}
