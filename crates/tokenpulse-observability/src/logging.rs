//! Structured logging setup
//!
//! One subscriber for the whole process, configured from `AppConfig` and
//! overridable per-target through `RUST_LOG`. HTTP and cache client
//! internals are held at warn so tick-level logs stay readable.

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Output format for the process-wide subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for interactive runs
    Pretty,
    /// One JSON object per line, for log aggregation
    Json,
    /// Terse single-line output
    Compact,
}

impl LogFormat {
    /// Parse the config string, falling back to the pretty format
    pub fn from_name(name: &str) -> Self {
        match name {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

fn noise_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
        .add_directive("hyper=warn".parse().expect("static directive"))
        .add_directive("reqwest=warn".parse().expect("static directive"))
        .add_directive("redis=warn".parse().expect("static directive"))
}

/// Install the global subscriber in the requested format
pub fn init_logging(format: LogFormat, default_level: Level) {
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Pretty => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(noise_filter(default_level))
        .init();
}
