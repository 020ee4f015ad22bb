//! # Observability
//!
//! Structured logging for the bootstrap CLI and library.

pub mod logging;

pub use logging::{init_logging, log_config_info};
