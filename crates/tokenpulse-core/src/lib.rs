//! Tokenpulse Core
//!
//! Canonical types, change events, error taxonomy, seam traits, and
//! configuration for the tokenpulse aggregator.

pub mod config;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::*;
pub use error::*;
pub use events::*;
pub use traits::*;
pub use types::*;
