//! Shared helpers for the socket-level test suites.

use std::time::Duration;

/// Generous upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(3);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}
