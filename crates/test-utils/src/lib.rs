pub mod builders;
pub mod fake_executor;
pub mod fakes;

use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Route swarm logs through the test harness capture.
///
/// Filtered by `RUST_LOG`, `info` when unset. Idempotent.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Poll interval small enough that scenario tests finish in milliseconds.
pub const FAST_POLL: Duration = Duration::from_millis(5);

/// Await `f`, panicking if a swarm under test stalls for more than 5 s.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("swarm test stalled for 5 seconds")
}
