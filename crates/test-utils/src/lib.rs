//! Shared fixtures for the assetflow integration tests.
//!
//! - [`operators`]: canned operators that record, fail, sleep or panic.
//! - [`builders`]: small graphs and config builders.

pub mod builders;
pub mod operators;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Route `tracing` output into the test harness.
///
/// Output is captured and only shown for failing tests. Set
/// `ASSETFLOW_LOG=debug` to see more.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env(assetflow::logging::LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Fail the test if `f` takes longer than five seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    with_timeout_of(DEFAULT_TIMEOUT, f).await
}

pub async fn with_timeout_of<F, T>(limit: Duration, f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, f).await {
        Ok(value) => value,
        Err(_) => panic!("test did not finish within {limit:?}"),
    }
}
