//! Logging setup and process-wide helpers

mod logging;
mod once;

pub use logging::{setup_logging, LogConfig};
pub(crate) use once::call_once_per_type;
