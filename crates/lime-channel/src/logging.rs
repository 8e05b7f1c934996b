//! Tracing subscriber configuration for channel hosts.
//!
//! Log levels follow these conventions:
//! - ERROR: channel faults, protocol violations
//! - WARN: recoverable errors, unexpected but handled conditions
//! - INFO: session lifecycle (established, finished, failed)
//! - DEBUG: state transitions, handshake steps, module activity
//! - TRACE: per-envelope pump and buffer activity

use tracing_subscriber::EnvFilter;

fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize the tracing subscriber with sensible defaults.
///
/// Log level can be controlled via the `RUST_LOG` environment variable;
/// without it, the lime crates log at `info`.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(filter("warn,lime_channel=info,lime_transport=info"))
        .init();
}

/// Initialize the tracing subscriber with flattened JSON output, for
/// hosts that ship logs to a collector.
pub fn init_json() {
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_env_filter(filter("warn,lime_channel=info,lime_transport=info"))
        .init();
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` so every test in a binary may call it; output goes
/// through the test writer and only shows for failing tests.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter("lime_channel=debug,info"))
        .with_test_writer()
        .try_init();
}
