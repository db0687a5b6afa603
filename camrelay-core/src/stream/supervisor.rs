//! Lifecycle of the transcoding process and the viewer set it feeds.
//!
//! The supervisor is a plain state machine: it never awaits. It is owned by
//! the stream coordinator, which serializes every call into it.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transcoder::{
    TranscoderError, TranscoderEvent, TranscoderHandle, TranscoderLauncher, TranscoderSink,
};
use super::viewer::{CloseReason, Delivery, ViewerHandle};
use crate::error::Result;
use crate::metrics;
use crate::models::ViewerId;

pub struct StreamSupervisor {
    launcher: Arc<dyn TranscoderLauncher>,
    events: mpsc::Sender<(u64, TranscoderEvent)>,
    viewers: HashMap<ViewerId, ViewerHandle>,
    process: Option<TranscoderHandle>,
    last_generation: u64,
    /// Oldest generation whose queued chunks viewers may still receive.
    floor: watch::Sender<u64>,
}

impl StreamSupervisor {
    pub fn new(
        launcher: Arc<dyn TranscoderLauncher>,
        events: mpsc::Sender<(u64, TranscoderEvent)>,
    ) -> Self {
        Self {
            launcher,
            events,
            viewers: HashMap::new(),
            process: None,
            last_generation: 0,
            floor: watch::Sender::new(0),
        }
    }

    /// Generation floor for new viewer queues.
    #[must_use]
    pub fn generation_floor(&self) -> watch::Receiver<u64> {
        self.floor.subscribe()
    }

    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.process.is_some()
    }

    /// Generation of the running process, if any.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        self.process.as_ref().map(|p| p.generation)
    }

    pub fn register_viewer(&mut self, viewer: ViewerHandle) {
        debug!(viewer_id = %viewer.id(), "Viewer registered");
        self.viewers.insert(viewer.id().clone(), viewer);
        metrics::ACTIVE_VIEWERS.set(self.viewers.len() as i64);
    }

    /// Remove a viewer; the last one leaving stops the process.
    pub fn deregister_viewer(&mut self, id: &ViewerId) -> bool {
        let removed = self.viewers.remove(id).is_some();
        if removed {
            debug!(viewer_id = %id, "Viewer deregistered");
            metrics::ACTIVE_VIEWERS.set(self.viewers.len() as i64);
            if self.viewers.is_empty() {
                self.stop();
            }
        }
        removed
    }

    /// Spawn the transcoder for `source_url`.
    ///
    /// No-op when a process is already running or the source is empty. A
    /// spawn failure is handled like any other process error before it is
    /// returned.
    pub fn start(&mut self, source_url: &str) -> Result<()> {
        if self.process.is_some() || source_url.is_empty() {
            return Ok(());
        }

        self.last_generation += 1;
        let generation = self.last_generation;
        let stop = CancellationToken::new();
        let sink = TranscoderSink::new(generation, self.events.clone());

        match self.launcher.launch(source_url, sink, stop.clone()) {
            Ok(()) => {
                metrics::TRANSCODER_SPAWNS.with_label_values(&["started"]).inc();
                info!(generation, viewers = self.viewers.len(), "Stream started");
                self.process = Some(TranscoderHandle { generation, stop });
                Ok(())
            }
            Err(e) => {
                metrics::TRANSCODER_SPAWNS.with_label_values(&["failed"]).inc();
                self.fail(&e);
                Err(e.into())
            }
        }
    }

    /// Request termination and forget the process right away.
    ///
    /// Chunks already queued for viewers by this or any earlier process are
    /// discarded on the viewer side, even when the process had exited on its
    /// own before.
    pub fn stop(&mut self) {
        self.floor.send_replace(self.last_generation + 1);
        if let Some(process) = self.process.take() {
            process.stop.cancel();
            metrics::TRANSCODER_EXITS.with_label_values(&["stopped"]).inc();
            info!(generation = process.generation, "Stream stopped");
        }
    }

    pub fn on_transcoder_event(&mut self, generation: u64, event: TranscoderEvent) {
        if self.generation() != Some(generation) {
            debug!(generation, current = ?self.generation(), "Dropping event from stale transcoder");
            return;
        }

        match event {
            TranscoderEvent::Output(chunk) => self.broadcast(generation, chunk),
            TranscoderEvent::Exited(code) => {
                self.process = None;
                metrics::TRANSCODER_EXITS.with_label_values(&["exited"]).inc();
                warn!(generation, code = ?code, viewers = self.viewers.len(), "Transcoder exited");
            }
            TranscoderEvent::Failed(e) => {
                metrics::TRANSCODER_EXITS.with_label_values(&["failed"]).inc();
                self.fail(&e);
            }
        }
    }

    /// Hand `chunk` from the process of `generation` to every viewer without
    /// blocking on any of them.
    pub fn broadcast(&mut self, generation: u64, chunk: Bytes) {
        metrics::BROADCAST_CHUNKS.inc();
        metrics::BROADCAST_BYTES.inc_by(chunk.len() as u64);

        let mut gone = Vec::new();
        let mut lagging = Vec::new();
        for (id, viewer) in &self.viewers {
            match viewer.deliver(generation, chunk.clone()) {
                Delivery::Delivered => {}
                Delivery::Lagging => lagging.push(id.clone()),
                Delivery::Gone => gone.push(id.clone()),
            }
        }
        if gone.is_empty() && lagging.is_empty() {
            return;
        }

        for id in gone {
            self.viewers.remove(&id);
            debug!(viewer_id = %id, "Viewer went away");
        }
        for id in lagging {
            if let Some(viewer) = self.viewers.remove(&id) {
                metrics::VIEWER_EVICTIONS.inc();
                warn!(viewer_id = %id, "Evicting viewer that fell behind");
                viewer.close(CloseReason::TooSlow);
            }
        }
        metrics::ACTIVE_VIEWERS.set(self.viewers.len() as i64);
        if self.viewers.is_empty() {
            self.stop();
        }
    }

    /// Close every viewer with an encoder error and clear the process.
    fn fail(&mut self, err: &TranscoderError) {
        error!(error = %err, viewers = self.viewers.len(), "Transcoder failed");
        if let Some(process) = self.process.take() {
            process.stop.cancel();
        }
        for (_, viewer) in self.viewers.drain() {
            viewer.close(CloseReason::EncoderError);
        }
        metrics::ACTIVE_VIEWERS.set(0);
    }
}
