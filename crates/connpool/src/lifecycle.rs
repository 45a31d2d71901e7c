//! Connection lifecycle management.
//!
//! This module holds the wrapper the pool keeps around every raw connection,
//! the bookkeeping attached to it, and the validation gate applied before an
//! idle connection is handed out.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;

use crate::connection::Connection;

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Identifier for this connection, unique within its pool.
    pub id: u64,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection last re-entered the idle queue.
    pub last_renewed: Instant,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
    /// Whether the connection belongs to the pool's floor.
    ///
    /// Pinned connections are never evicted for idleness, only for failing
    /// a health check.
    pub pinned: bool,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection.
    pub fn new(id: u64, pinned: bool) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_renewed: now,
            checkout_count: 0,
            pinned,
        }
    }

    /// Check if the connection has been idle for longer than `idle_timeout`.
    ///
    /// Always false for pinned connections.
    #[must_use]
    pub fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        !self.pinned && self.last_renewed.elapsed() > idle_timeout
    }

    /// Mark the connection as checked out.
    pub fn mark_checkout(&mut self) {
        self.checkout_count += 1;
    }

    /// Mark the connection as returned to idle.
    pub fn renew(&mut self) {
        self.last_renewed = Instant::now();
    }
}

/// Why an idle connection was refused at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eviction {
    /// Idle for longer than the configured idle timeout.
    Stale,
    /// Health check returned an error or panicked.
    Unhealthy,
}

impl Eviction {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// A raw connection plus its pool bookkeeping.
///
/// Lives in exactly one place at a time: the idle queue, a checked-out
/// guard, or the close path.
pub(crate) struct IdleConnection<C> {
    pub(crate) raw: C,
    pub(crate) meta: ConnectionMetadata,
}

impl<C: Connection> IdleConnection<C> {
    pub(crate) fn new(raw: C, id: u64, pinned: bool) -> Self {
        Self {
            raw,
            meta: ConnectionMetadata::new(id, pinned),
        }
    }

    /// Decide whether this idle connection may be handed to a caller.
    ///
    /// The idle-timeout check runs first and short-circuits the health check.
    pub(crate) async fn validate(
        &mut self,
        idle_timeout: Option<Duration>,
        health_check: bool,
    ) -> Result<(), Eviction> {
        if let Some(timeout) = idle_timeout {
            if self.meta.is_idle_expired(timeout) {
                return Err(Eviction::Stale);
            }
        }

        if health_check {
            match AssertUnwindSafe(self.raw.health_check())
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(id = self.meta.id, error = %e, "health check failed");
                    return Err(Eviction::Unhealthy);
                }
                Err(_) => {
                    tracing::warn!(id = self.meta.id, "health check panicked");
                    return Err(Eviction::Unhealthy);
                }
            }
        }

        Ok(())
    }

    /// Close the raw connection, absorbing errors and panics.
    ///
    /// Returns `false` when the close did not complete cleanly.
    pub(crate) async fn close(mut self) -> bool {
        let id = self.meta.id;
        match AssertUnwindSafe(self.raw.close()).catch_unwind().await {
            Ok(Ok(())) => {
                tracing::trace!(id, "connection closed");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(id, error = %e, "failed to close connection");
                false
            }
            Err(_) => {
                tracing::warn!(id, "connection close panicked");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_connection_metadata_new() {
        let meta = ConnectionMetadata::new(7, true);
        assert_eq!(meta.id, 7);
        assert_eq!(meta.checkout_count, 0);
        assert!(meta.pinned);
        assert_eq!(meta.created_at, meta.last_renewed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_respects_pin() {
        let pinned = ConnectionMetadata::new(1, true);
        let floating = ConnectionMetadata::new(2, false);

        tokio::time::advance(Duration::from_secs(16)).await;

        assert!(!pinned.is_idle_expired(Duration::from_secs(15)));
        assert!(floating.is_idle_expired(Duration::from_secs(15)));
        assert!(!floating.is_idle_expired(Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_resets_idle_clock() {
        let mut meta = ConnectionMetadata::new(1, false);
        tokio::time::advance(Duration::from_secs(10)).await;
        meta.renew();
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(!meta.is_idle_expired(Duration::from_secs(15)));
        assert!(meta.last_renewed > meta.created_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_counter() {
        let mut meta = ConnectionMetadata::new(1, false);
        meta.mark_checkout();
        meta.mark_checkout();
        assert_eq!(meta.checkout_count, 2);
    }

    #[test]
    fn test_eviction_labels() {
        assert_eq!(Eviction::Stale.as_str(), "stale");
        assert_eq!(Eviction::Unhealthy.as_str(), "unhealthy");
    }
}
