use std::sync::Arc;
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::LoggingConfig;

/// Target under which ffmpeg's stderr lines are logged.
pub const TRANSCODER_TARGET: &str = "camrelay::transcoder";

/// Initialize structured logging based on configuration
///
/// `RUST_LOG` takes precedence over `logging.level`. Either may be a plain
/// level or a full directive list such as `camrelay_core=debug,tower_http=info`.
/// Unless the active filter names the transcoder target itself, it is set to
/// `logging.transcoder_level`.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(config, env.as_deref())?;

    let writer = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let layer = if config.format == "json" {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_target(true)
            .with_line_number(true)
            .with_file(false)
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;
    Ok(())
}

fn build_filter(config: &LoggingConfig, env: Option<&str>) -> anyhow::Result<EnvFilter> {
    let directives = env.filter(|d| !d.trim().is_empty()).unwrap_or(config.level.as_str());
    let filter = EnvFilter::try_new(directives)
        .map_err(|e| anyhow::anyhow!("Invalid log filter {directives:?}: {e}"))?;

    if directives.contains(TRANSCODER_TARGET) {
        return Ok(filter);
    }
    let transcoder: Directive = format!("{TRANSCODER_TARGET}={}", config.transcoder_level)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!("Invalid transcoder log level {:?}: {e}", config.transcoder_level)
        })?;
    Ok(filter.add_directive(transcoder))
}
