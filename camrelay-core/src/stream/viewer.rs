//! Per-viewer delivery queues.
//!
//! The supervisor holds a [`ViewerHandle`] for every registered viewer and
//! only ever uses non-blocking sends on it. The transport side drains the
//! matching [`ViewerSubscription`].
//!
//! Queued chunks carry the generation of the process that produced them.
//! When the supervisor stops a process it raises the shared generation floor,
//! and [`ChunkReceiver`] discards anything still queued from below it.

use bytes::Bytes;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};

use crate::models::ViewerId;

/// Close reason sent to viewers that try to attach before a session exists.
pub const CLOSE_NOT_CONNECTED: &str = "Camera not connected";

/// Why the supervisor closed a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The transcoder failed; every viewer gets this.
    EncoderError,
    /// This viewer's queue filled up.
    TooSlow,
}

impl CloseReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EncoderError => "Stream encoder error",
            Self::TooSlow => "Viewer too slow",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of handing one chunk to a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Queue is full.
    Lagging,
    /// The transport side has gone away.
    Gone,
}

#[derive(Debug)]
pub struct ViewerHandle {
    id: ViewerId,
    chunks: mpsc::Sender<(u64, Bytes)>,
    close: Option<oneshot::Sender<CloseReason>>,
}

impl ViewerHandle {
    #[must_use]
    pub const fn id(&self) -> &ViewerId {
        &self.id
    }

    /// Queue `chunk`, produced by the process of `generation`.
    pub fn deliver(&self, generation: u64, chunk: Bytes) -> Delivery {
        match self.chunks.try_send((generation, chunk)) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Lagging,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Gone,
        }
    }

    /// Tell the transport side to close with `reason`. Dropping the handle
    /// afterwards ends the chunk stream.
    pub fn close(mut self, reason: CloseReason) {
        if let Some(tx) = self.close.take() {
            let _ = tx.send(reason);
        }
    }
}

/// Receiving end of a viewer queue.
#[derive(Debug)]
pub struct ChunkReceiver {
    rx: mpsc::Receiver<(u64, Bytes)>,
    floor: watch::Receiver<u64>,
}

impl ChunkReceiver {
    /// Next chunk from a process that has not been stopped, or `None` once
    /// the supervisor dropped the viewer.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            let (generation, chunk) = self.rx.recv().await?;
            if self.is_current(generation) {
                return Some(chunk);
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<Bytes, TryRecvError> {
        loop {
            let (generation, chunk) = self.rx.try_recv()?;
            if self.is_current(generation) {
                return Ok(chunk);
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        generation >= *self.floor.borrow()
    }
}

/// Transport-side end of a registered viewer.
#[derive(Debug)]
pub struct ViewerSubscription {
    pub id: ViewerId,
    pub chunks: ChunkReceiver,
    pub closed: oneshot::Receiver<CloseReason>,
}

/// Create a connected handle/subscription pair with a queue of `capacity`
/// chunks. Chunks from generations below the value in `floor` are never
/// handed out.
#[must_use]
pub fn viewer_channel(
    capacity: usize,
    floor: watch::Receiver<u64>,
) -> (ViewerHandle, ViewerSubscription) {
    let id = ViewerId::new();
    let (chunk_tx, chunk_rx) = mpsc::channel(capacity.max(1));
    let (close_tx, close_rx) = oneshot::channel();
    (
        ViewerHandle {
            id: id.clone(),
            chunks: chunk_tx,
            close: Some(close_tx),
        },
        ViewerSubscription {
            id,
            chunks: ChunkReceiver {
                rx: chunk_rx,
                floor,
            },
            closed: close_rx,
        },
    )
}
