//! Structured logging setup for Confero services

use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format for the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, for production log shipping
    Json,
    /// Human-readable output, for development
    Console,
}

/// Initialize the global subscriber for a Confero service.
///
/// The filter comes from `RUST_LOG` when set, falling back to
/// `default_level`. Target, file, and line are always recorded.
pub fn init(service_name: &str, default_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_current_span(false)
                        .with_span_list(false),
                )
                .init();
        }
        LogFormat::Console => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
    }

    tracing::info!(
        service = service_name,
        format = ?format,
        "Logging initialized"
    );
}

/// Initialize JSON logging (production)
pub fn init_logging(service_name: &str, default_level: &str) {
    init(service_name, default_level, LogFormat::Json);
}

/// Initialize console logging (development)
pub fn init_console_logging(service_name: &str, default_level: &str) {
    init(service_name, default_level, LogFormat::Console);
}
