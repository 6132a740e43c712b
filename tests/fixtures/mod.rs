pub mod account;

use tracing_subscriber::EnvFilter;

/// Install a subscriber once per test binary; later calls are no-ops.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
