//! Connection capability set and factory abstraction.
//!
//! The pool never looks inside a connection. It only needs to be able to
//! probe it ([`Connection::health_check`]) and tear it down
//! ([`Connection::close`]). [`Connection::execute`] exists for the caller's
//! own units of work and is never invoked by the pool.

use std::future::Future;

/// A long-lived resource that can be pooled.
///
/// Uses `#[async_trait]` so the pool can hold factories as trait objects and
/// so the futures returned by these methods are `Send`.
#[async_trait::async_trait]
pub trait Connection: Send + 'static {
    /// Payload accepted by [`Connection::execute`].
    type Payload: Send;

    /// Error produced by this connection and by its factory.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Check whether the connection is still usable.
    ///
    /// Called on every checkout of an idle connection (unless disabled with
    /// [`PoolConfig::test_on_checkout`](crate::PoolConfig::test_on_checkout)).
    /// Should be cheap: a ping, a `SELECT 1`, a no-op RPC.
    async fn health_check(&mut self) -> Result<(), Self::Error>;

    /// Release the underlying resource.
    ///
    /// Called exactly once by the pool when the connection is evicted,
    /// drained, or refused on return. Errors are logged and absorbed.
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Use the connection.
    async fn execute(&mut self, payload: Self::Payload) -> Result<(), Self::Error>;
}

/// Produces new connections for the pool.
///
/// Implemented for any `Fn() -> impl Future<Output = Result<C, C::Error>>`,
/// so a closure is usually all that is needed:
///
/// ```rust,ignore
/// let pool = Pool::new(config, || async { MyConn::connect("10.0.0.1:5000").await }).await?;
/// ```
///
/// Implement it on a struct when the factory carries state of its own.
#[async_trait::async_trait]
pub trait ConnectionFactory<C: Connection>: Send + Sync + 'static {
    /// Create a new connection.
    async fn connect(&self) -> Result<C, C::Error>;
}

#[async_trait::async_trait]
impl<C, F, Fut> ConnectionFactory<C> for F
where
    C: Connection,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, C::Error>> + Send + 'static,
{
    async fn connect(&self) -> Result<C, C::Error> {
        (self)().await
    }
}
