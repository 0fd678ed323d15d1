//! Absolute time bounds for blocking operations.
//!
//! Every suspension point in this crate takes a [`Deadline`] rather than a
//! relative timeout, so that a caller retrying a sequence of operations can
//! share one bound across all of them. Deadlines are measured against the
//! monotonic [`Instant`] clock.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// An absolute point in time after which a blocking operation gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deadline {
  /// Never block: report the current readiness or fail at once.
  Immediately,
  /// Block until this instant at most.
  At(Instant),
  /// Block indefinitely.
  Never,
}

impl Deadline {
  /// A deadline that never elapses.
  #[inline]
  pub const fn never() -> Self {
    Deadline::Never
  }

  /// A deadline that has already elapsed.
  #[inline]
  pub const fn immediately() -> Self {
    Deadline::Immediately
  }

  /// A deadline at the given instant.
  #[inline]
  pub const fn at(instant: Instant) -> Self {
    Deadline::At(instant)
  }

  /// A deadline `timeout` from now. Saturates to [`Deadline::Never`] if the
  /// instant cannot be represented.
  pub fn after(timeout: Duration) -> Self {
    match Instant::now().checked_add(timeout) {
      Some(instant) => Deadline::At(instant),
      None => Deadline::Never,
    }
  }

  /// Returns `true` once the deadline has passed.
  pub fn has_elapsed(&self) -> bool {
    match self {
      Deadline::Immediately => true,
      Deadline::At(instant) => Instant::now() >= *instant,
      Deadline::Never => false,
    }
  }

  /// Time left until the deadline, `None` for [`Deadline::Never`].
  ///
  /// Returns `Some(Duration::ZERO)` once the deadline has elapsed.
  pub fn remaining(&self) -> Option<Duration> {
    match self {
      Deadline::Immediately => Some(Duration::ZERO),
      Deadline::At(instant) => Some(instant.saturating_duration_since(Instant::now())),
      Deadline::Never => None,
    }
  }

  /// The instant this deadline refers to, if it is a concrete point in time.
  pub fn instant(&self) -> Option<Instant> {
    match self {
      Deadline::At(instant) => Some(*instant),
      _ => None,
    }
  }
}

impl Default for Deadline {
  fn default() -> Self {
    Deadline::Never
  }
}

impl Ord for Deadline {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Deadline::Immediately, Deadline::Immediately) => Ordering::Equal,
      (Deadline::Immediately, _) => Ordering::Less,
      (_, Deadline::Immediately) => Ordering::Greater,
      (Deadline::Never, Deadline::Never) => Ordering::Equal,
      (Deadline::Never, _) => Ordering::Greater,
      (_, Deadline::Never) => Ordering::Less,
      (Deadline::At(a), Deadline::At(b)) => a.cmp(b),
    }
  }
}

impl PartialOrd for Deadline {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl From<Duration> for Deadline {
  fn from(timeout: Duration) -> Self {
    Deadline::after(timeout)
  }
}

impl From<Instant> for Deadline {
  fn from(instant: Instant) -> Self {
    Deadline::At(instant)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sentinels() {
    assert!(Deadline::immediately().has_elapsed());
    assert!(!Deadline::never().has_elapsed());
    assert_eq!(Deadline::never().remaining(), None);
    assert_eq!(Deadline::immediately().remaining(), Some(Duration::ZERO));
  }

  #[test]
  fn past_instant_has_elapsed() {
    let past = Instant::now() - Duration::from_millis(5);
    let deadline = Deadline::at(past);
    assert!(deadline.has_elapsed());
    assert_eq!(deadline.remaining(), Some(Duration::ZERO));
  }

  #[test]
  fn ordering_is_monotonic() {
    let soon = Deadline::after(Duration::from_millis(10));
    let later = Deadline::after(Duration::from_secs(10));
    assert!(Deadline::Immediately < soon);
    assert!(soon < later);
    assert!(later < Deadline::Never);
    assert_eq!(soon.min(later), soon);
    assert_eq!(Deadline::Never.min(Deadline::Immediately), Deadline::Immediately);
  }

  #[test]
  fn huge_timeout_saturates() {
    assert_eq!(Deadline::after(Duration::MAX), Deadline::Never);
  }
}
