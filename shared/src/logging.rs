//! Shared logging utilities for consistent tracing across the harness

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::types::DebugComponents;

/// Build the filter directive used by the harness subscriber.
///
/// Verbose mode, or any debug selector, lowers the harness crates to `debug`.
/// HTTP plumbing used by the mock servers stays at `warn` either way.
pub fn filter_directive(debug: DebugComponents, verbose: bool) -> String {
    let base_level = if verbose || debug != DebugComponents::None {
        "debug"
    } else {
        "info"
    };
    format!("testenv={base_level},shared={base_level},axum=warn,hyper=warn,reqwest=warn")
}

/// Initialize the tracing subscriber for the harness.
///
/// Safe to call more than once: later calls are ignored, which lets every
/// test initialize logging without coordinating.
pub fn init_tracing(debug: DebugComponents, verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let directive = filter_directive(debug, verbose);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for component-aware info logging
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(
            component = %$component,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware warning logging
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(
            component = %$component,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware error logging
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(
            component = %$component,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware debug logging
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(
            component = %$component,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: &str, details: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: &str, reason: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(component: &str, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = %component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(component: &str, message: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_levels() {
        assert!(filter_directive(DebugComponents::None, false).starts_with("testenv=info"));
        assert!(filter_directive(DebugComponents::Envoy, false).starts_with("testenv=debug"));
        assert!(filter_directive(DebugComponents::None, true).contains("shared=debug"));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = format_timestamp();
        assert_eq!(ts.len(), "12:34:56.789".len());
        assert_eq!(&ts[2..3], ":");
    }
}
