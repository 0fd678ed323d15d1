use std::io;

use thiserror::Error;

/// A boxed error returned by a connection factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when validating a pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The size range is empty (`min_size > max_size`).
  #[error("pool size range is empty: min_size {min} exceeds max_size {max}")]
  EmptyRange { min: usize, max: usize },
  /// A pool that may never hold a connection cannot serve a borrow.
  #[error("pool max_size cannot be zero")]
  ZeroMaxSize,
}

/// Errors returned by [`Pool`](crate::Pool) operations.
#[derive(Debug, Error)]
pub enum PoolError {
  /// No connection became available before the borrow deadline.
  #[error("timed out waiting for a pooled connection")]
  Timeout,
  /// The pool has been closed.
  #[error("pool is closed")]
  Closed,
  /// The calling coroutine was canceled while waiting.
  #[error("borrow canceled")]
  Canceled,
  /// The connection factory failed. The factory's error is the source.
  #[error("failed to create connection: {0}")]
  Create(#[source] BoxError),
  /// The configuration handed to the pool is invalid.
  #[error("invalid pool configuration: {0}")]
  Config(#[from] BuildError),
}

impl PoolError {
  /// Returns `true` if the borrow deadline elapsed.
  pub fn is_timeout(&self) -> bool {
    matches!(self, PoolError::Timeout)
  }
}

/// Errors returned by [`Client::send`](crate::Client::send).
#[derive(Debug, Error)]
pub enum ClientError {
  /// Borrowing a connection failed. Never retried.
  #[error(transparent)]
  Pool(#[from] PoolError),
  /// Every attempt failed with an I/O error; this is the last one.
  #[error("request failed after {attempts} attempt(s): {source}")]
  Io {
    attempts: usize,
    #[source]
    source: io::Error,
  },
}

impl ClientError {
  /// The I/O error of the final attempt, if the request got that far.
  pub fn io_error(&self) -> Option<&io::Error> {
    match self {
      ClientError::Io { source, .. } => Some(source),
      ClientError::Pool(_) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::error::Error as _;

  #[test]
  fn create_error_keeps_source() {
    let err = PoolError::Create(Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")));
    assert!(err.to_string().contains("refused"));
    let source = err.source().and_then(|s| s.downcast_ref::<io::Error>());
    assert_eq!(source.map(|e| e.kind()), Some(io::ErrorKind::ConnectionRefused));
  }

  #[test]
  fn pool_errors_pass_through_client_error() {
    let err: ClientError = PoolError::Closed.into();
    assert_eq!(err.to_string(), "pool is closed");
    assert!(err.io_error().is_none());
  }

  #[test]
  fn build_error_display() {
    let err = BuildError::EmptyRange { min: 4, max: 2 };
    assert_eq!(
      err.to_string(),
      "pool size range is empty: min_size 4 exceeds max_size 2"
    );
    let err: PoolError = BuildError::ZeroMaxSize.into();
    assert!(matches!(err, PoolError::Config(BuildError::ZeroMaxSize)));
  }
}
