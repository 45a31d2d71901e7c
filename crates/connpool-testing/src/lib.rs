//! # connpool-testing
//!
//! Test infrastructure for connpool development.
//!
//! This crate provides a mock backend whose connections implement
//! [`connpool::Connection`], so the pool can be exercised without any real
//! service behind it.
//!
//! ## Features
//!
//! - Mock connections with lifecycle counters
//! - Runtime fault injection (refused connects, failing health checks,
//!   failing or panicking closes)
//! - Concurrency tracking for `execute` calls
//! - Pool fixtures and tracing setup for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use connpool_testing::{MockBackend, PoolFixture};
//!
//! #[tokio::test]
//! async fn test_with_fixture() {
//!     let fixture = PoolFixture::new(PoolFixture::small_config(), MockBackend::default())
//!         .await
//!         .unwrap();
//!     assert_eq!(fixture.pool.active(), (2, 2));
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock;

pub use fixtures::{PoolFixture, init_tracing};
pub use mock::{
    ConnectFuture, MockBackend, MockBackendBuilder, MockBackendConfig, MockConnection, MockError,
};
