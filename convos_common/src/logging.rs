//! Test logging helpers, enabled with the `test-utils` feature.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn filter_directive(level: &str) -> EnvFilter {
    let filter =
        format!("convos_core={level},convos_invite={level},convos_common={level}");
    EnvFilter::builder().parse_lossy(filter)
}

/// Install a global tracing subscriber for tests. Safe to call repeatedly.
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter_directive("debug"))
            .with_test_writer()
            .try_init();
    });
}
