pub mod id;
pub mod session;

pub use id::{generate_id, ViewerId};
pub use session::{
    CameraSession, ConnectOutcome, ConnectRequest, ConnectionParams, SessionState,
};
