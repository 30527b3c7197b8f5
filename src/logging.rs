//! Logging setup.
//! Filter controlled by RUST_LOG (default: wm_harness=debug,smithay=warn).

use std::sync::Once;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "wm_harness=debug,smithay=warn";

/// Installs the stderr subscriber. Later calls are no-ops.
pub fn init() {
    static INIT_LOG: Once = Once::new();
    INIT_LOG.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// Subscriber for test binaries: output is captured per test and quiet
/// unless RUST_LOG asks for more.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
