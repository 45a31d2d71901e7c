//! Test fixture utilities.

use std::time::Duration;

use connpool::{Pool, PoolConfig, PoolError};

use crate::mock::{MockBackend, MockConnection};

/// Install a `tracing` subscriber for tests.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A pool wired to a mock backend.
pub struct PoolFixture {
    /// The backend behind the pool.
    pub backend: MockBackend,
    /// The pool under test.
    pub pool: Pool<MockConnection>,
}

impl PoolFixture {
    /// Build a pool over `backend` with `config`.
    pub async fn new(config: PoolConfig, backend: MockBackend) -> Result<Self, PoolError> {
        let pool = Pool::new(config, backend.factory()).await?;
        Ok(Self { backend, pool })
    }

    /// The load scenario configuration: 5 pinned, 20 max, 15 s idle timeout.
    #[must_use]
    pub fn scenario_config() -> PoolConfig {
        PoolConfig::new()
            .min_connections(5)
            .max_connections(20)
            .idle_timeout(Duration::from_secs(15))
    }

    /// Small configuration for focused tests: 2 pinned, 4 max, 1 s wait.
    #[must_use]
    pub fn small_config() -> PoolConfig {
        PoolConfig::new()
            .min_connections(2)
            .max_connections(4)
            .idle_timeout(Duration::from_secs(15))
            .connection_timeout(Duration::from_secs(1))
    }
}
