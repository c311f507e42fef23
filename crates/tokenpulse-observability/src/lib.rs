//! Tokenpulse Observability
//!
//! Structured logging setup shared by the binary and tools.

pub mod logging;

pub use logging::{init_logging, LogFormat};
