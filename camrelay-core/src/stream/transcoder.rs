//! Transcoding process management.
//!
//! A [`TranscoderLauncher`] turns a source URL into a running process whose
//! output and termination are reported as [`TranscoderEvent`]s through a
//! [`TranscoderSink`]. Every launch is tagged with a generation so the
//! supervisor can tell current events from those of a process it already
//! stopped.

use bytes::{Bytes, BytesMut};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TranscoderConfig;
use crate::logging::TRANSCODER_TARGET;

#[derive(Debug, Error)]
pub enum TranscoderError {
    #[error("Failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read transcoder output: {0}")]
    Output(#[source] std::io::Error),
}

#[derive(Debug)]
pub enum TranscoderEvent {
    /// One chunk of encoded output, in emission order.
    Output(Bytes),
    /// The process ended on its own or after a stop request.
    Exited(Option<i32>),
    Failed(TranscoderError),
}

/// Where a launched process reports to.
#[derive(Debug, Clone)]
pub struct TranscoderSink {
    generation: u64,
    tx: mpsc::Sender<(u64, TranscoderEvent)>,
}

impl TranscoderSink {
    #[must_use]
    pub const fn new(generation: u64, tx: mpsc::Sender<(u64, TranscoderEvent)>) -> Self {
        Self { generation, tx }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once nobody is listening anymore.
    pub async fn emit(&self, event: TranscoderEvent) -> bool {
        self.tx.send((self.generation, event)).await.is_ok()
    }
}

/// Supervisor-side record of a running process.
#[derive(Debug)]
pub struct TranscoderHandle {
    pub generation: u64,
    pub stop: CancellationToken,
}

pub trait TranscoderLauncher: Send + Sync {
    /// Start a process reading from `source_url`.
    ///
    /// Must return without waiting for the process. Cancelling `stop` asks
    /// the process to terminate; the eventual exit is still reported through
    /// `sink`.
    fn launch(
        &self,
        source_url: &str,
        sink: TranscoderSink,
        stop: CancellationToken,
    ) -> Result<(), TranscoderError>;
}

/// Launches ffmpeg with a fixed low-latency MPEG-TS/MPEG-1 profile.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    binary: String,
    stop_grace: Duration,
    read_chunk_bytes: usize,
}

impl FfmpegLauncher {
    #[must_use]
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            stop_grace: config.stop_grace(),
            read_chunk_bytes: config.read_chunk_bytes.max(1),
        }
    }

    /// Arguments for reading `source_url` over RTSP/TCP and writing MPEG-TS
    /// with MPEG-1 video to stdout.
    #[must_use]
    pub fn low_latency_args(source_url: &str) -> Vec<String> {
        [
            "-rtsp_transport",
            "tcp",
            "-i",
            source_url,
            "-f",
            "mpegts",
            "-codec:v",
            "mpeg1video",
            "-r",
            "25",
            "-b:v",
            "800k",
            "-bf",
            "0",
            "-muxdelay",
            "0.001",
            "pipe:1",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }
}

impl TranscoderLauncher for FfmpegLauncher {
    fn launch(
        &self,
        source_url: &str,
        sink: TranscoderSink,
        stop: CancellationToken,
    ) -> Result<(), TranscoderError> {
        let mut child = Command::new(&self.binary)
            .args(Self::low_latency_args(source_url))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscoderError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| TranscoderError::Spawn {
            binary: self.binary.clone(),
            source: std::io::Error::other("stdout was not captured"),
        })?;
        let stdin = child.stdin.take();
        let generation = sink.generation();

        info!(generation, pid = ?child.id(), "Transcoder started");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, generation));
        }
        tokio::spawn(run_process(ProcessTask {
            child,
            stdout,
            stdin,
            sink,
            stop,
            stop_grace: self.stop_grace,
            read_chunk_bytes: self.read_chunk_bytes,
        }));
        Ok(())
    }
}

struct ProcessTask {
    child: Child,
    stdout: ChildStdout,
    stdin: Option<ChildStdin>,
    sink: TranscoderSink,
    stop: CancellationToken,
    stop_grace: Duration,
    read_chunk_bytes: usize,
}

async fn run_process(task: ProcessTask) {
    let ProcessTask {
        mut child,
        mut stdout,
        stdin,
        sink,
        stop,
        stop_grace,
        read_chunk_bytes,
    } = task;
    let generation = sink.generation();
    let mut buf = BytesMut::with_capacity(read_chunk_bytes);

    loop {
        buf.reserve(read_chunk_bytes);
        tokio::select! {
            () = stop.cancelled() => {
                drop(stdout);
                let code = terminate(&mut child, stdin, stop_grace, generation).await;
                sink.emit(TranscoderEvent::Exited(code)).await;
                return;
            }
            read = stdout.read_buf(&mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    let chunk = buf.split().freeze();
                    if !sink.emit(TranscoderEvent::Output(chunk)).await {
                        drop(stdout);
                        terminate(&mut child, stdin, stop_grace, generation).await;
                        return;
                    }
                }
                Err(e) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    sink.emit(TranscoderEvent::Failed(TranscoderError::Output(e))).await;
                    return;
                }
            }
        }
    }

    // stdout closed: the process is exiting by itself
    drop(stdin);
    match child.wait().await {
        Ok(status) => {
            sink.emit(TranscoderEvent::Exited(status.code())).await;
        }
        Err(e) => {
            sink.emit(TranscoderEvent::Failed(TranscoderError::Output(e)))
                .await;
        }
    }
}

/// Ask ffmpeg to quit through its interactive `q` command, then kill it if it
/// is still around after `grace`.
async fn terminate(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    grace: Duration,
    generation: u64,
) -> Option<i32> {
    if let Some(mut stdin) = stdin {
        if stdin.write_all(b"q").await.is_ok() {
            let _ = stdin.flush().await;
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(generation, code = ?status.code(), "Transcoder quit after stop request");
            status.code()
        }
        Ok(Err(e)) => {
            warn!(generation, error = %e, "Failed to wait for transcoder");
            None
        }
        Err(_) => {
            warn!(generation, "Transcoder ignored stop request, killing");
            let _ = child.start_kill();
            child.wait().await.ok().and_then(|status| status.code())
        }
    }
}

async fn forward_stderr(stderr: ChildStderr, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: TRANSCODER_TARGET, generation, "{line}");
    }
}
