//! Connection pool implementation.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::connection::{Connection, ConnectionFactory};
use crate::error::PoolError;
use crate::lifecycle::{ConnectionMetadata, IdleConnection};

/// A bounded pool of reusable connections.
///
/// The pool keeps `min_connections` pinned connections alive for its whole
/// life, grows lazily up to `max_connections` under load, and evicts grown
/// connections once they sit idle longer than `idle_timeout`. Every idle
/// connection is validated before it is handed out.
///
/// Cloning a `Pool` is cheap and yields a handle to the same pool.
pub struct Pool<C: Connection> {
    inner: Arc<PoolInner<C>>,
}

struct PoolInner<C: Connection> {
    config: PoolConfig,
    factory: Box<dyn ConnectionFactory<C>>,
    /// Open-connection counter and the closed flag. Always locked before `idle`.
    state: Mutex<PoolState>,
    idle: Mutex<VecDeque<IdleConnection<C>>>,
    /// Signalled when a connection is returned or a slot is freed.
    idle_ready: Notify,
    next_id: AtomicU64,
}

#[derive(Debug, Default)]
struct PoolState {
    open: u32,
    closed: bool,
}

impl<C: Connection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<C: Connection> Pool<C> {
    /// Create a pool and fill it with `min_connections` connections.
    ///
    /// Fails with [`PoolError::Configuration`] for an invalid configuration
    /// and with [`PoolError::ConnectionCreation`] if the factory fails while
    /// filling the pool; in that case every connection created so far is
    /// closed before returning.
    pub async fn new<F>(config: PoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: ConnectionFactory<C>,
    {
        Self::with_factory(config, Box::new(factory)).await
    }

    /// Create a builder for configuring a pool.
    #[must_use]
    pub fn builder() -> PoolBuilder<C> {
        PoolBuilder::new()
    }

    async fn with_factory(
        config: PoolConfig,
        factory: Box<dyn ConnectionFactory<C>>,
    ) -> Result<Self, PoolError> {
        config.validate()?;

        let inner = Arc::new(PoolInner {
            idle: Mutex::new(VecDeque::with_capacity(config.max_connections as usize)),
            config,
            factory,
            state: Mutex::new(PoolState::default()),
            idle_ready: Notify::new(),
            next_id: AtomicU64::new(1),
        });

        inner.fill().await?;

        tracing::info!(
            min = inner.config.min_connections,
            max = inner.config.max_connections,
            idle_timeout = ?inner.config.idle_timeout,
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Borrow a connection, run `work` against it, and return it to the pool.
    ///
    /// The connection goes back to the pool exactly once, whether `work`
    /// succeeds, fails, panics, or this future is dropped before completion.
    /// The result of `work` is passed through unchanged; pool failures are
    /// converted into `E`.
    ///
    /// ```rust,ignore
    /// pool.handle(|conn| Box::pin(async move { conn.execute(payload).await })).await?;
    /// ```
    pub async fn handle<T, E, W>(&self, work: W) -> Result<T, E>
    where
        W: for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, Result<T, E>>,
        E: From<PoolError>,
    {
        if self.is_closed() {
            return Err(PoolError::PoolClosed.into());
        }

        let mut conn = self.get().await?;
        let result = work(&mut *conn).await;
        conn.release().await;
        result
    }

    /// Get a connection from the pool.
    ///
    /// This will either return a validated idle connection or create a new one
    /// if the pool is not at capacity. If all connections are in use and the
    /// pool is at capacity, this will wait until a connection becomes available
    /// or the connection timeout is reached.
    pub async fn get(&self) -> Result<PooledConnection<C>, PoolError> {
        self.inner.ensure_open()?;
        tracing::trace!("acquiring connection from pool");

        let conn = self.inner.acquire().await?;
        Ok(PooledConnection::new(conn, Arc::clone(&self.inner)))
    }

    /// Get an idle connection without creating one and without waiting.
    ///
    /// Returns `Ok(None)` when no valid idle connection is available.
    pub async fn try_get(&self) -> Result<Option<PooledConnection<C>>, PoolError> {
        self.inner.ensure_open()?;

        Ok(self
            .inner
            .checkout_idle()
            .await
            .map(|conn| PooledConnection::new(conn, Arc::clone(&self.inner))))
    }

    /// Return a connection to the pool explicitly.
    ///
    /// Equivalent to dropping the guard, except that a connection which has to
    /// be closed is closed before this returns. A connection that belongs to
    /// another pool is handed back to its own pool and reported as
    /// [`PoolError::InvalidArgument`].
    pub async fn put(&self, conn: PooledConnection<C>) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&conn.pool, &self.inner) {
            let err = PoolError::InvalidArgument("connection belongs to a different pool".into());
            tracing::warn!(error = %err, "rejecting foreign connection");
            conn.release().await;
            return Err(err);
        }

        conn.release().await;
        Ok(())
    }

    /// Close every idle connection without closing the pool.
    ///
    /// Checked-out connections are not affected. Later acquisitions recreate
    /// connections on demand.
    pub async fn release(&self) {
        let closing: Vec<_> = self
            .inner
            .drain_idle()
            .into_iter()
            .map(|conn| self.inner.discard(conn))
            .collect();
        tracing::info!(count = closing.len(), "releasing idle connections");

        for close in closing {
            close.await;
        }
    }

    /// Close the pool.
    ///
    /// Wakes every waiting caller with [`PoolError::PoolClosed`], closes all
    /// idle connections, and makes every later operation fail. Connections
    /// still checked out are closed as they come back. Calling this more than
    /// once is harmless.
    pub async fn close(&self) -> Result<(), PoolError> {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }
        self.inner.idle_ready.notify_waiters();

        let closing: Vec<_> = self
            .inner
            .drain_idle()
            .into_iter()
            .map(|conn| self.inner.discard(conn))
            .collect();
        let count = closing.len();
        let mut failed = 0;
        for close in closing {
            if !close.await {
                failed += 1;
            }
        }

        tracing::info!(closed = count, failed, "connection pool closed");

        if failed > 0 {
            return Err(PoolError::CloseFailed { failed });
        }
        Ok(())
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of open connections and number of idle connections.
    ///
    /// Each value is read consistently; the pair is not a single snapshot.
    #[must_use]
    pub fn active(&self) -> (u32, u32) {
        let open = self.inner.state.lock().open;
        (open, self.inner.idle_len())
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let (total, available) = self.active();
        PoolStatus {
            available,
            in_use: total.saturating_sub(available),
            total,
            max: self.inner.config.max_connections,
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<C: Connection> PoolInner<C> {
    fn ensure_open(&self) -> Result<(), PoolError> {
        if self.state.lock().closed {
            return Err(PoolError::PoolClosed);
        }
        Ok(())
    }

    fn idle_len(&self) -> u32 {
        u32::try_from(self.idle.lock().len()).unwrap_or(u32::MAX)
    }

    fn drain_idle(&self) -> Vec<IdleConnection<C>> {
        self.idle.lock().drain(..).collect()
    }

    /// Create the pinned floor of connections.
    async fn fill(&self) -> Result<(), PoolError> {
        for _ in 0..self.config.min_connections {
            let created = match self.try_reserve()? {
                Some(slot) => self.create(slot).await,
                None => Err(PoolError::Configuration(
                    "min_connections exceeds pool capacity".into(),
                )),
            };

            match created {
                Ok(conn) => {
                    if let Err(conn) = self.return_idle(conn) {
                        self.discard(conn).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fill pool, closing created connections");
                    for conn in self.drain_idle() {
                        self.discard(conn).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn acquire(&self) -> Result<IdleConnection<C>, PoolError> {
        if let Some(conn) = self.checkout_idle().await {
            return Ok(conn);
        }
        if let Some(slot) = self.try_reserve()? {
            return self.create(slot).await;
        }
        self.wait_for_connection().await
    }

    /// Pop idle connections until one passes validation or the queue is empty.
    async fn checkout_idle(&self) -> Option<IdleConnection<C>> {
        let idle_timeout = self.config.idle_eviction();

        for _ in 0..=self.config.max_connections {
            let mut conn = self.idle.lock().pop_front()?;
            // Held while validating so a cancelled checkout still frees the slot.
            let slot = SlotReservation::held(self, conn.meta.pinned);

            match conn.validate(idle_timeout, self.config.test_on_checkout).await {
                Ok(()) => {
                    slot.commit();
                    return Some(conn);
                }
                Err(reason) => {
                    tracing::debug!(id = conn.meta.id, reason = reason.as_str(), "evicting idle connection");
                    conn.close().await;
                    drop(slot);
                }
            }
        }
        None
    }

    /// Wait for a returned connection or a freed slot, up to the connection timeout.
    ///
    /// The deadline covers the whole wait, including health checks of
    /// returned connections and factory calls for freed slots.
    async fn wait_for_connection(&self) -> Result<IdleConnection<C>, PoolError> {
        let timeout = self.config.connection_timeout;
        let deadline = Instant::now() + timeout;
        tracing::trace!(?timeout, "pool saturated, waiting for a connection");

        match tokio::time::timeout_at(deadline, self.wait_loop()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(?timeout, "timed out waiting for a connection");
                Err(PoolError::AcquisitionTimeout(timeout))
            }
        }
    }

    async fn wait_loop(&self) -> Result<IdleConnection<C>, PoolError> {
        loop {
            let notified = self.idle_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(conn) = self.checkout_idle().await {
                return Ok(conn);
            }
            if let Some(slot) = self.try_reserve()? {
                return self.create(slot).await;
            }

            notified.await;
        }
    }

    /// Reserve room for one more connection, if the pool has any.
    fn try_reserve(&self) -> Result<Option<SlotReservation<'_, C>>, PoolError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PoolError::PoolClosed);
        }
        if state.open >= self.config.max_connections {
            return Ok(None);
        }

        let pinned = state.open < self.config.min_connections;
        state.open += 1;
        Ok(Some(SlotReservation::held(self, pinned)))
    }

    async fn create(&self, slot: SlotReservation<'_, C>) -> Result<IdleConnection<C>, PoolError> {
        let raw = self.factory.connect().await.map_err(|e| {
            tracing::warn!(error = %e, "connection factory failed");
            PoolError::creation(e)
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pinned = slot.pinned;
        slot.commit();

        tracing::debug!(id, pinned, "connection created");
        Ok(IdleConnection::new(raw, id, pinned))
    }

    /// Put a connection back in the idle queue, or hand it back if refused.
    fn return_idle(&self, mut conn: IdleConnection<C>) -> Result<(), IdleConnection<C>> {
        conn.meta.renew();

        {
            let state = self.state.lock();
            if state.closed {
                return Err(conn);
            }
            let mut idle = self.idle.lock();
            if idle.len() >= self.config.max_connections as usize {
                return Err(conn);
            }
            idle.push_back(conn);
        }

        self.idle_ready.notify_one();
        Ok(())
    }

    async fn release(&self, conn: IdleConnection<C>) {
        let id = conn.meta.id;
        match self.return_idle(conn) {
            Ok(()) => tracing::trace!(id, "returned connection to pool"),
            Err(conn) => {
                tracing::debug!(id, "pool refused connection, closing it");
                self.discard(conn).await;
            }
        }
    }

    /// Close a connection and give its slot back.
    ///
    /// The slot is taken before the returned future is first polled, so it is
    /// freed even if `close` fails, panics, or the future is dropped unpolled.
    fn discard(&self, conn: IdleConnection<C>) -> impl Future<Output = bool> + Send + '_ {
        let slot = SlotReservation::held(self, conn.meta.pinned);
        async move {
            let _slot = slot;
            conn.close().await
        }
    }

    fn free_slot(&self) {
        {
            let mut state = self.state.lock();
            state.open = state.open.saturating_sub(1);
        }
        self.idle_ready.notify_one();
    }
}

impl<C: Connection> PoolInner<C> {
    /// Release path usable from `Drop`, where nothing can be awaited.
    fn release_from_drop(self: &Arc<Self>, conn: IdleConnection<C>) {
        let Err(conn) = self.return_idle(conn) else {
            return;
        };

        // Owned by the close task, so the slot is freed even if that task
        // never runs (runtime shutting down).
        let slot = OwnedSlot {
            pool: Arc::clone(self),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _slot = slot;
                    conn.close().await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    id = conn.meta.id,
                    "no async runtime available, dropping connection without closing it"
                );
                drop(slot);
            }
        }
    }
}

/// A counted slot owned outside any borrow of the pool; freed on drop.
struct OwnedSlot<C: Connection> {
    pool: Arc<PoolInner<C>>,
}

impl<C: Connection> Drop for OwnedSlot<C> {
    fn drop(&mut self) {
        self.pool.free_slot();
    }
}

/// One counted unit of pool capacity.
///
/// Dropping an uncommitted reservation gives the slot back, which keeps the
/// open counter right when a factory call fails or an acquisition is
/// cancelled mid-creation.
struct SlotReservation<'a, C: Connection> {
    pool: &'a PoolInner<C>,
    pinned: bool,
    committed: bool,
}

impl<'a, C: Connection> SlotReservation<'a, C> {
    /// Wrap a slot already counted in `open`.
    fn held(pool: &'a PoolInner<C>, pinned: bool) -> Self {
        Self {
            pool,
            pinned,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl<C: Connection> Drop for SlotReservation<'_, C> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.free_slot();
        }
    }
}

/// Builder for [`Pool`].
pub struct PoolBuilder<C: Connection> {
    config: PoolConfig,
    factory: Option<Box<dyn ConnectionFactory<C>>>,
}

impl<C: Connection> PoolBuilder<C> {
    /// Create a builder with the default configuration and no factory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
            factory: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the factory used to create connections.
    #[must_use]
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: ConnectionFactory<C>,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Enable or disable health-checking connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.config.test_on_checkout = enabled;
        self
    }

    /// Build the pool, filling it with `min_connections` connections.
    pub async fn build(self) -> Result<Pool<C>, PoolError> {
        let factory = self
            .factory
            .ok_or_else(|| PoolError::Configuration("a connection factory is required".into()))?;
        Pool::with_factory(self.config, factory).await
    }
}

impl<C: Connection> Default for PoolBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently checked out or being created.
    pub in_use: u32,
    /// Total number of open connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Checked-out connections as a percentage of `max`.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        f64::from(self.in_use) / f64::from(self.max) * 100.0
    }
}

/// A connection retrieved from the pool.
///
/// Dereferences to the raw connection. When dropped, the connection is
/// automatically returned to the pool.
pub struct PooledConnection<C: Connection> {
    conn: Option<IdleConnection<C>>,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connection> PooledConnection<C> {
    fn new(mut conn: IdleConnection<C>, pool: Arc<PoolInner<C>>) -> Self {
        conn.meta.mark_checkout();
        tracing::trace!(id = conn.meta.id, "connection checked out");
        Self {
            conn: Some(conn),
            pool,
        }
    }

    #[allow(clippy::expect_used)] // only `release`/`detach`/`drop` take the connection, all consuming self
    fn inner(&self) -> &IdleConnection<C> {
        self.conn.as_ref().expect("pooled connection already returned")
    }

    #[allow(clippy::expect_used)]
    fn inner_mut(&mut self) -> &mut IdleConnection<C> {
        self.conn.as_mut().expect("pooled connection already returned")
    }

    /// Bookkeeping the pool keeps for this connection.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.inner().meta
    }

    /// Return the connection to the pool, closing it first if it is refused.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn).await;
        }
    }

    /// Detach the connection from the pool.
    ///
    /// The pool forgets the connection and frees its slot; closing it becomes
    /// the caller's responsibility.
    #[must_use]
    pub fn detach(mut self) -> C {
        let conn = self.inner_take();
        tracing::debug!(id = conn.meta.id, "connection detached from pool");
        self.pool.free_slot();
        conn.raw
    }

    #[allow(clippy::expect_used)]
    fn inner_take(&mut self) -> IdleConnection<C> {
        self.conn.take().expect("pooled connection already returned")
    }
}

impl<C: Connection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner().raw
    }
}

impl<C: Connection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.inner_mut().raw
    }
}

impl<C: Connection> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("metadata", &self.conn.as_ref().map(|c| &c.meta))
            .finish()
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::trace!(id = conn.meta.id, "returning dropped connection to pool");
            self.pool.release_from_drop(conn);
        }
    }
}
