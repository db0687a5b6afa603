use thiserror::Error;

use crate::stream::TranscoderError;

/// Errors surfaced by the camera session, PTZ and stream components.
///
/// Messages coming from the camera or the transcoder are carried verbatim so
/// that callers see exactly what the collaborator reported.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Connect(String),

    #[error("{0}")]
    NotConnected(String),

    #[error("{0}")]
    Device(String),

    #[error("Transcoder error: {0}")]
    Transcoder(#[from] TranscoderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by the request or the camera rather than by
    /// this process.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Connect(_) | Self::NotConnected(_) | Self::Device(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
