// camrelay API Library
//
// HTTP and WebSocket surface of the camera relay

pub mod http;

// Re-export commonly used types
pub use http::{create_router, AppState};
