//! Live stream relay: transcoder process, viewer fan-out and the coordinator
//! that owns both.

pub mod coordinator;
pub mod supervisor;
pub mod transcoder;
pub mod viewer;

pub use coordinator::{CoordinatorHandle, StreamCoordinator, StreamStatus};
pub use supervisor::StreamSupervisor;
pub use transcoder::{
    FfmpegLauncher, TranscoderError, TranscoderEvent, TranscoderHandle, TranscoderLauncher,
    TranscoderSink,
};
pub use viewer::{
    viewer_channel, ChunkReceiver, CloseReason, Delivery, ViewerHandle, ViewerSubscription,
    CLOSE_NOT_CONNECTED,
};
