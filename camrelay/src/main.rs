mod server;

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use camrelay_api::AppState;
use camrelay_core::{
    camera::OnvifConnector,
    logging,
    ptz::PtzController,
    session::CameraSessionManager,
    stream::{FfmpegLauncher, StreamCoordinator},
    Config,
};

use server::CamRelayServer;

#[derive(Parser, Debug)]
#[command(name = "camrelay")]
#[command(about = "Live video relay and PTZ gateway for a single network camera", long_about = None)]
struct Args {
    /// Configuration file (YAML or TOML); falls back to ./config.yaml
    #[arg(long, env = "CAMRELAY_CONFIG_PATH")]
    config: Option<String>,

    /// HTTP listen port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// ffmpeg executable
    #[arg(long, env = "FFMPEG_BIN")]
    ffmpeg_bin: Option<String>,
}

fn load_config(args: &Args) -> Result<Config> {
    let path = args.config.clone().or_else(|| {
        let cwd = "config.yaml";
        Path::new(cwd).exists().then(|| cwd.to_string())
    });
    if let Some(path) = &path {
        eprintln!("Loading config from {path}");
    }

    let mut config = Config::load(path.as_deref())?;
    if let Some(port) = args.port {
        config.server.http_port = port;
    }
    if let Some(binary) = &args.ffmpeg_bin {
        config.transcoder.binary.clone_from(binary);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = load_config(&args)?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("camrelay starting...");
    info!("HTTP address: {}", config.http_address());
    info!("Transcoder: {}", config.transcoder.binary);

    // 4. Stream coordinator
    let launcher = Arc::new(FfmpegLauncher::new(&config.transcoder));
    let (coordinator, coordinator_task) = StreamCoordinator::spawn(launcher, &config.stream);

    // 5. Camera session and PTZ
    let connector = Arc::new(OnvifConnector::new(&config.camera)?);
    let sessions = CameraSessionManager::new(
        connector,
        coordinator.clone(),
        config.camera.fallback_source.clone(),
    );
    let ptz = PtzController::new(coordinator.clone());

    let state = AppState {
        sessions,
        ptz,
        coordinator,
    };

    // 6. Serve until shutdown
    CamRelayServer::new(config, state, coordinator_task)
        .start()
        .await
}
