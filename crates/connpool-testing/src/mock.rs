//! Mock connections for exercising the pool without a real backend.
//!
//! A [`MockBackend`] plays the part of the remote service: it hands out
//! [`MockConnection`]s through its factory, counts every lifecycle call, and
//! lets tests inject failures at runtime.
//!
//! ## Example
//!
//! ```rust,ignore
//! use connpool::{Pool, PoolConfig};
//! use connpool_testing::MockBackend;
//!
//! #[tokio::test]
//! async fn test_with_mock_backend() {
//!     let backend = MockBackend::builder()
//!         .with_execute_delay(Duration::from_millis(50))
//!         .build();
//!
//!     let pool = Pool::new(PoolConfig::new(), backend.factory()).await.unwrap();
//!     backend.set_healthy(false);
//!     // Every idle connection now fails its health check...
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use connpool::Connection;
use parking_lot::Mutex;
use thiserror::Error;

/// Future returned by [`MockBackend::factory`].
pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<MockConnection, MockError>> + Send>>;

/// Error type for mock connection operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockError {
    /// The backend refused to open a connection.
    #[error("connection refused by mock backend")]
    Refused,

    /// The connection failed its health check.
    #[error("mock connection {0} is unhealthy")]
    Unhealthy(u64),

    /// Closing the connection failed.
    #[error("mock connection {0} failed to close")]
    CloseFailed(u64),

    /// The connection was used after being closed.
    #[error("mock connection {0} used after close")]
    UseAfterClose(u64),
}

/// Configuration for a [`MockBackend`].
#[derive(Debug, Clone, Default)]
pub struct MockBackendConfig {
    /// Delay before a new connection is handed out.
    pub connect_delay: Duration,
    /// Time spent in every `execute` call.
    pub execute_delay: Duration,
    /// Time spent in every health check.
    pub health_check_delay: Duration,
    /// Refuse every connection attempt after this many successes.
    pub refuse_after: Option<usize>,
}

/// Builder for [`MockBackend`].
#[derive(Debug, Default)]
pub struct MockBackendBuilder {
    config: MockBackendConfig,
}

impl MockBackendBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every connection attempt.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.config.connect_delay = delay;
        self
    }

    /// Make every `execute` call take this long.
    #[must_use]
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.config.execute_delay = delay;
        self
    }

    /// Make every health check take this long.
    #[must_use]
    pub fn with_health_check_delay(mut self, delay: Duration) -> Self {
        self.config.health_check_delay = delay;
        self
    }

    /// Refuse connections once `count` have been opened.
    #[must_use]
    pub fn refuse_after(mut self, count: usize) -> Self {
        self.config.refuse_after = Some(count);
        self
    }

    /// Build the backend.
    #[must_use]
    pub fn build(self) -> MockBackend {
        MockBackend {
            shared: Arc::new(Shared {
                config: self.config,
                ..Shared::default()
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    config: MockBackendConfig,
    next_id: AtomicU64,
    created: AtomicUsize,
    closed: AtomicUsize,
    health_checks: AtomicUsize,
    executed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    refuse: AtomicBool,
    unhealthy: AtomicBool,
    fail_close: AtomicBool,
    panic_on_close: AtomicBool,
    payloads: Mutex<Vec<String>>,
}

/// A simulated remote service that hands out [`MockConnection`]s.
///
/// Cloning shares the same counters and fault switches.
#[derive(Debug, Clone)]
pub struct MockBackend {
    shared: Arc<Shared>,
}

impl Default for MockBackend {
    fn default() -> Self {
        MockBackendBuilder::new().build()
    }
}

impl MockBackend {
    /// Create a backend builder.
    #[must_use]
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder::new()
    }

    /// Open a connection, honouring the configured delay and fault switches.
    pub async fn connect(&self) -> Result<MockConnection, MockError> {
        let shared = &self.shared;
        if !shared.config.connect_delay.is_zero() {
            tokio::time::sleep(shared.config.connect_delay).await;
        }

        if shared.refuse.load(Ordering::SeqCst) {
            return Err(MockError::Refused);
        }
        if let Some(limit) = shared.config.refuse_after {
            if shared.created.load(Ordering::SeqCst) >= limit {
                return Err(MockError::Refused);
            }
        }

        let id = shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        shared.created.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(id, "mock connection opened");

        Ok(MockConnection {
            id,
            closed: false,
            shared: Arc::clone(shared),
        })
    }

    /// A factory closure suitable for [`connpool::Pool::new`].
    pub fn factory(&self) -> impl Fn() -> ConnectFuture + Send + Sync + 'static {
        let backend = self.clone();
        move || -> ConnectFuture {
            let backend = backend.clone();
            Box::pin(async move { backend.connect().await })
        }
    }

    /// Refuse (or accept again) new connections.
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make health checks pass or fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.shared.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// Make `close` return an error.
    pub fn set_fail_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Make `close` panic.
    pub fn set_panic_on_close(&self, panic: bool) {
        self.shared.panic_on_close.store(panic, Ordering::SeqCst);
    }

    /// Number of connections opened so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    /// Number of `close` calls so far, including failed ones.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed.
    #[must_use]
    pub fn live(&self) -> usize {
        self.created().saturating_sub(self.closed())
    }

    /// Number of health checks performed.
    #[must_use]
    pub fn health_checks(&self) -> usize {
        self.shared.health_checks.load(Ordering::SeqCst)
    }

    /// Number of completed `execute` calls.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.shared.executed.load(Ordering::SeqCst)
    }

    /// Highest number of `execute` calls that ran at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Payloads seen by `execute`, in completion order.
    #[must_use]
    pub fn payloads(&self) -> Vec<String> {
        self.shared.payloads.lock().clone()
    }
}

/// A connection handed out by a [`MockBackend`].
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    closed: bool,
    shared: Arc<Shared>,
}

impl MockConnection {
    /// Backend-assigned identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether `close` has been called on this connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    type Payload = String;
    type Error = MockError;

    async fn health_check(&mut self) -> Result<(), MockError> {
        self.shared.health_checks.fetch_add(1, Ordering::SeqCst);
        if !self.shared.config.health_check_delay.is_zero() {
            tokio::time::sleep(self.shared.config.health_check_delay).await;
        }
        if self.shared.unhealthy.load(Ordering::SeqCst) {
            return Err(MockError::Unhealthy(self.id));
        }
        Ok(())
    }

    #[allow(clippy::panic)]
    async fn close(&mut self) -> Result<(), MockError> {
        self.closed = true;
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(id = self.id, "mock connection closed");

        if self.shared.panic_on_close.load(Ordering::SeqCst) {
            panic!("mock connection {} panicked on close", self.id);
        }
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(MockError::CloseFailed(self.id));
        }
        Ok(())
    }

    async fn execute(&mut self, payload: String) -> Result<(), MockError> {
        if self.closed {
            return Err(MockError::UseAfterClose(self.id));
        }

        let shared = &self.shared;
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !shared.config.execute_delay.is_zero() {
            tokio::time::sleep(shared.config.execute_delay).await;
        }

        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        shared.executed.fetch_add(1, Ordering::SeqCst);
        shared.payloads.lock().push(payload);
        Ok(())
    }
}
