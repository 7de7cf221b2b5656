//! Shared setup for integration tests

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness; `RUST_LOG` overrides the level
#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Unique scratch path under the system temp directory
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("plume-sim-{}-{name}", std::process::id()))
}
