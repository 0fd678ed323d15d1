//! Builder-style configuration for pools and clients.

use crate::error::BuildError;

use std::ops::RangeInclusive;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_SIZE: usize = 10;
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRIES: usize = 10;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sizing and timeouts of a [`Pool`](crate::Pool).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
  /// Connections created up front and kept warm.
  pub min_size: usize,
  /// Upper bound on borrowed plus idle connections.
  pub max_size: usize,
  /// Time allowed for closing each idle connection when the pool closes.
  pub close_timeout: Duration,
  /// Upper bound on a single connection creation. The borrow deadline
  /// applies as well; the earlier of the two wins.
  pub create_timeout: Duration,
}

impl Default for PoolConfig {
  fn default() -> Self {
    PoolConfig {
      min_size: 0,
      max_size: DEFAULT_MAX_SIZE,
      close_timeout: DEFAULT_CLOSE_TIMEOUT,
      create_timeout: DEFAULT_CREATE_TIMEOUT,
    }
  }
}

impl PoolConfig {
  /// Creates a configuration keeping `size.start()` connections warm and
  /// never exceeding `size.end()` live connections.
  pub fn new(size: RangeInclusive<usize>) -> Result<Self, BuildError> {
    let config = PoolConfig {
      min_size: *size.start(),
      max_size: *size.end(),
      ..PoolConfig::default()
    };
    config.validate()?;
    Ok(config)
  }

  /// Sets the per-connection close timeout used by [`Pool::close`](crate::Pool::close).
  pub fn close_timeout(mut self, timeout: Duration) -> Self {
    self.close_timeout = timeout;
    self
  }

  /// Sets the upper bound on creating one connection.
  pub fn create_timeout(mut self, timeout: Duration) -> Self {
    self.create_timeout = timeout;
    self
  }

  /// Checks the size range.
  pub fn validate(&self) -> Result<(), BuildError> {
    if self.max_size == 0 {
      return Err(BuildError::ZeroMaxSize);
    }
    if self.min_size > self.max_size {
      return Err(BuildError::EmptyRange {
        min: self.min_size,
        max: self.max_size,
      });
    }
    Ok(())
  }
}

/// Retry policy and pool settings of a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
  /// Maximum number of attempts per request, counting the first one.
  /// A value of `0` is treated as `1`.
  pub retries: usize,
  pub pool: PoolConfig,
  /// Upper bound on one request/response exchange.
  pub request_timeout: Duration,
}

impl Default for ClientConfig {
  fn default() -> Self {
    ClientConfig {
      retries: DEFAULT_RETRIES,
      pool: PoolConfig::default(),
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
    }
  }
}

impl ClientConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn retries(mut self, retries: usize) -> Self {
    self.retries = retries;
    self
  }

  pub fn pool(mut self, pool: PoolConfig) -> Self {
    self.pool = pool;
    self
  }

  pub fn request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn range_is_validated() {
    assert_eq!(PoolConfig::new(0..=0), Err(BuildError::ZeroMaxSize));
    #[allow(clippy::reversed_empty_ranges)]
    let empty = 4..=2;
    assert_eq!(
      PoolConfig::new(empty),
      Err(BuildError::EmptyRange { min: 4, max: 2 })
    );
    let config = PoolConfig::new(2..=4).unwrap();
    assert_eq!((config.min_size, config.max_size), (2, 4));
  }

  #[test]
  fn builder_overrides_defaults() {
    let config = ClientConfig::new()
      .retries(3)
      .request_timeout(Duration::from_secs(1))
      .pool(PoolConfig::new(1..=1).unwrap().create_timeout(Duration::from_millis(250)));
    assert_eq!(config.retries, 3);
    assert_eq!(config.pool.max_size, 1);
    assert_eq!(config.pool.create_timeout, Duration::from_millis(250));
    assert_eq!(config.pool.close_timeout, DEFAULT_CLOSE_TIMEOUT);
    assert_eq!(ClientConfig::default().retries, 10);
  }
}
