pub mod camera;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod ptz;
pub mod session;
pub mod stream;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
