//! Pool error types.

use thiserror::Error;

/// Boxed error produced by a connection or its factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Failed to acquire a connection within the timeout.
    #[error("connection acquisition timeout after {0:?}")]
    AcquisitionTimeout(std::time::Duration),

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Connection creation failed.
    #[error("failed to create connection: {0}")]
    ConnectionCreation(#[source] BoxError),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// An argument passed to the pool was not acceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Some connections could not be closed cleanly during shutdown.
    #[error("{failed} connection(s) failed to close")]
    CloseFailed {
        /// Number of connections whose `close` returned an error or panicked.
        failed: usize,
    },
}

impl PoolError {
    /// Whether retrying the same operation later can succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionTimeout(_) | Self::ConnectionCreation(_)
        )
    }

    pub(crate) fn creation(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::ConnectionCreation(Box::new(err))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::time::Duration;

    #[derive(Debug, Error)]
    #[error("refused")]
    struct Refused;

    #[test]
    fn test_creation_keeps_source() {
        let err = PoolError::creation(Refused);
        assert_eq!(err.to_string(), "failed to create connection: refused");
        assert_eq!(err.source().unwrap().to_string(), "refused");
    }

    #[test]
    fn test_transient_classification() {
        assert!(PoolError::AcquisitionTimeout(Duration::from_secs(10)).is_transient());
        assert!(PoolError::creation(Refused).is_transient());
        assert!(!PoolError::PoolClosed.is_transient());
        assert!(!PoolError::Configuration("min".into()).is_transient());
    }
}
