//! Single owner of the camera session and the stream supervisor.
//!
//! Request handlers, viewer transports and transcoder tasks never touch
//! shared state directly. They send messages to one task which applies them
//! in order, so the session record and the process lifecycle always change
//! together.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::supervisor::StreamSupervisor;
use super::transcoder::{TranscoderEvent, TranscoderLauncher};
use super::viewer::{viewer_channel, ViewerSubscription, CLOSE_NOT_CONNECTED};
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::models::{CameraSession, SessionState, ViewerId};

#[derive(Debug)]
enum Command {
    RegisterViewer {
        reply: oneshot::Sender<Result<ViewerSubscription>>,
    },
    DeregisterViewer {
        id: ViewerId,
    },
    BeginReconnect {
        reply: oneshot::Sender<()>,
    },
    InstallSession {
        session: Box<CameraSession>,
        reply: oneshot::Sender<()>,
    },
    AbortReconnect {
        reply: oneshot::Sender<()>,
    },
    Session {
        reply: oneshot::Sender<Option<CameraSession>>,
    },
    Status {
        reply: oneshot::Sender<StreamStatus>,
    },
    Shutdown,
}

/// Snapshot of the relay state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub session: SessionState,
    pub profile_token: Option<String>,
    pub viewers: usize,
    pub streaming: bool,
    pub reconnecting: bool,
}

/// Cloneable handle for talking to the coordinator task.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| coordinator_gone())?;
        rx.await.map_err(|_| coordinator_gone())
    }

    /// Attach a new viewer. Fails with `NotConnected` when no session is
    /// installed.
    pub async fn register_viewer(&self) -> Result<ViewerSubscription> {
        self.request(|reply| Command::RegisterViewer { reply })
            .await?
    }

    pub async fn deregister_viewer(&self, id: ViewerId) {
        if self
            .commands
            .send(Command::DeregisterViewer { id })
            .await
            .is_err()
        {
            debug!("Coordinator gone while deregistering viewer");
        }
    }

    /// Stop the stream and hold off spawning until the pending handshake is
    /// resolved.
    pub async fn begin_reconnect(&self) -> Result<()> {
        self.request(|reply| Command::BeginReconnect { reply }).await
    }

    /// Replace the session record, restarting the stream for attached
    /// viewers.
    pub async fn install_session(&self, session: CameraSession) -> Result<()> {
        self.request(|reply| Command::InstallSession {
            session: Box::new(session),
            reply,
        })
        .await
    }

    /// Keep the current session after a failed handshake.
    pub async fn abort_reconnect(&self) -> Result<()> {
        self.request(|reply| Command::AbortReconnect { reply }).await
    }

    pub async fn session(&self) -> Result<Option<CameraSession>> {
        self.request(|reply| Command::Session { reply }).await
    }

    pub async fn status(&self) -> Result<StreamStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Stop the stream and end the coordinator task.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

fn coordinator_gone() -> Error {
    Error::Internal("Stream coordinator is not running".to_string())
}

pub struct StreamCoordinator {
    session: Option<CameraSession>,
    reconnecting: bool,
    supervisor: StreamSupervisor,
    viewer_queue_chunks: usize,
}

impl StreamCoordinator {
    /// Spawn the coordinator task.
    pub fn spawn(
        launcher: Arc<dyn TranscoderLauncher>,
        config: &StreamConfig,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let buffer = config.event_buffer.max(1);
        let (command_tx, command_rx) = mpsc::channel(buffer);
        let (event_tx, event_rx) = mpsc::channel(buffer);

        let coordinator = Self {
            session: None,
            reconnecting: false,
            supervisor: StreamSupervisor::new(launcher, event_tx),
            viewer_queue_chunks: config.viewer_queue_chunks,
        };
        let task = tokio::spawn(coordinator.run(command_rx, event_rx));

        (
            CoordinatorHandle {
                commands: command_tx,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<(u64, TranscoderEvent)>,
    ) {
        info!("Stream coordinator started");
        loop {
            tokio::select! {
                biased;
                Some((generation, event)) = events.recv() => {
                    self.supervisor.on_transcoder_event(generation, event);
                }
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
            }
        }
        self.supervisor.stop();
        info!("Stream coordinator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::RegisterViewer { reply } => {
                let result = self.register_viewer();
                let _ = reply.send(result);
            }
            Command::DeregisterViewer { id } => {
                self.supervisor.deregister_viewer(&id);
            }
            Command::BeginReconnect { reply } => {
                self.reconnecting = true;
                self.supervisor.stop();
                let _ = reply.send(());
            }
            Command::InstallSession { session, reply } => {
                self.supervisor.stop();
                info!(
                    source = %session.redacted_source_url(),
                    profile_token = ?session.profile_token,
                    "Camera session installed"
                );
                self.session = Some(*session);
                self.reconnecting = false;
                self.resume();
                let _ = reply.send(());
            }
            Command::AbortReconnect { reply } => {
                self.reconnecting = false;
                self.resume();
                let _ = reply.send(());
            }
            Command::Session { reply } => {
                let _ = reply.send(self.session.clone());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => {}
        }
    }

    fn register_viewer(&mut self) -> Result<ViewerSubscription> {
        let Some(session) = &self.session else {
            return Err(Error::NotConnected(CLOSE_NOT_CONNECTED.to_string()));
        };
        let source_url = session.source_url.clone();

        let (handle, subscription) =
            viewer_channel(self.viewer_queue_chunks, self.supervisor.generation_floor());
        self.supervisor.register_viewer(handle);
        if !self.reconnecting {
            if let Err(e) = self.supervisor.start(&source_url) {
                warn!(error = %e, "Could not start stream for new viewer");
            }
        }
        Ok(subscription)
    }

    /// Start the stream again if anyone is still watching.
    fn resume(&mut self) {
        if self.supervisor.viewer_count() == 0 {
            return;
        }
        if let Some(session) = &self.session {
            let source_url = session.source_url.clone();
            if let Err(e) = self.supervisor.start(&source_url) {
                warn!(error = %e, "Could not resume stream");
            }
        }
    }

    fn status(&self) -> StreamStatus {
        StreamStatus {
            session: if self.session.is_some() {
                SessionState::Connected
            } else {
                SessionState::Disconnected
            },
            profile_token: self
                .session
                .as_ref()
                .and_then(|s| s.profile_token.clone()),
            viewers: self.supervisor.viewer_count(),
            streaming: self.supervisor.is_running(),
            reconnecting: self.reconnecting,
        }
    }
}
