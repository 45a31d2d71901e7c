//! # connpool
//!
//! Bounded, concurrency-safe pool for long-lived connections that are
//! expensive to create and cheap to reuse.
//!
//! The pool decides when to create, validate, evict, or wait; callers only
//! borrow and return. The resource itself is supplied by the caller through
//! the [`Connection`] trait and a [`ConnectionFactory`].
//!
//! ## Features
//!
//! - A pinned floor of `min_connections` created up front
//! - Lazy growth up to `max_connections`
//! - Idle-timeout eviction for non-pinned connections
//! - Health check on every checkout of an idle connection
//! - Bounded wait with timeout when the pool is saturated
//! - Release-all and irreversible close
//!
//! ## Example
//!
//! ```rust,ignore
//! use connpool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .min_connections(5)
//!     .max_connections(20)
//!     .idle_timeout(Duration::from_secs(15));
//!
//! let pool = Pool::new(config, || async { RpcSession::open("10.0.0.7:7000").await }).await?;
//!
//! pool.handle(|conn| Box::pin(async move { conn.execute(request).await.map_err(Into::into) }))
//!     .await?;
//!
//! let (open, idle) = pool.active();
//! pool.close().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod pool;

pub use config::PoolConfig;
pub use connection::{Connection, ConnectionFactory};
pub use error::{BoxError, PoolError};
pub use lifecycle::ConnectionMetadata;
pub use pool::{Pool, PoolBuilder, PoolStatus, PooledConnection};
