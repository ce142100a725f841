use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::env::{EnvConfig, StoreEnvironment};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small environment config for unit tests.
pub fn small_env_config() -> EnvConfig {
    EnvConfig {
        max_store_size: 64 * 1024 * 1024,
        ..EnvConfig::default()
    }
}

/// Opens a fresh environment in a temporary directory.
///
/// The directory must outlive the environment, so both are returned.
pub fn temp_env() -> (TempDir, StoreEnvironment) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let env = StoreEnvironment::open(dir.path(), &small_env_config()).unwrap();
    (dir, env)
}
