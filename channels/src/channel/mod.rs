// src/channel/mod.rs

//! A typed, optionally buffered channel for passing values between coroutines.
//!
//! A [`Channel`] is a single cloneable handle: every clone can send, receive
//! and close. A capacity of `0` creates a rendezvous channel where a send
//! only completes once a receiver takes the value.
//!
//! Closing is idempotent in effect. After a close, no value can be sent;
//! values already buffered are still handed out in order, and only once the
//! buffer is drained do receivers observe [`RecvError::Closed`].
//!
//! ```
//! use braid::{Channel, Deadline};
//! use braid::error::RecvError;
//!
//! let chan = Channel::new(2);
//! chan.send("a", Deadline::never()).unwrap();
//! chan.send("b", Deadline::never()).unwrap();
//! chan.close().unwrap();
//!
//! assert_eq!(chan.receive(Deadline::never()), Ok("a"));
//! assert_eq!(chan.receive(Deadline::never()), Ok("b"));
//! assert_eq!(chan.receive(Deadline::never()), Err(RecvError::Closed));
//! ```

pub(crate) mod core;

use self::core::{ChanShared, RecvArm, SendArm};
use crate::deadline::Deadline;
use crate::error::{CloseError, RecvError, SendError, TryRecvError, TrySendError};
use crate::select::selector::{self, Choice};

use std::fmt;
use std::sync::Arc;

/// A handle to a channel. Cloning the handle shares the channel.
pub struct Channel<T> {
  pub(crate) shared: Arc<ChanShared<T>>,
}

impl<T> Clone for Channel<T> {
  fn clone(&self) -> Self {
    Channel {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T> fmt::Debug for Channel<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Channel").field("shared", &self.shared).finish()
  }
}

impl<T> Default for Channel<T> {
  fn default() -> Self {
    Channel::rendezvous()
  }
}

impl<T> Channel<T> {
  /// Creates a channel buffering up to `capacity` values.
  ///
  /// A capacity of `0` creates a rendezvous channel.
  pub fn new(capacity: usize) -> Self {
    Channel {
      shared: Arc::new(ChanShared::new(capacity)),
    }
  }

  /// Creates a rendezvous channel: every send waits for a receiver.
  pub fn rendezvous() -> Self {
    Self::new(0)
  }

  /// Creates a channel whose buffer is bounded only by available memory.
  pub fn unbounded() -> Self {
    Self::new(usize::MAX)
  }

  /// Sends `value`, blocking until a receiver takes it or a buffer slot is
  /// free, the channel is closed, or `deadline` elapses.
  ///
  /// # Errors
  ///
  /// The unsent value is handed back inside the error:
  /// - `SendError::Closed` if the channel was closed before the hand-off.
  /// - `SendError::Timeout` if the deadline elapsed first.
  /// - `SendError::Canceled` if the calling coroutine was canceled.
  pub fn send(&self, value: T, deadline: Deadline) -> Result<(), SendError<T>> {
    let mut arm = SendArm::new(&self.shared, value);
    let choice = selector::choose(&mut [&mut arm], deadline, false);
    if let Some(outcome) = arm.take_outcome() {
      return outcome;
    }
    match (arm.take_item(), choice) {
      (Some(value), Choice::Canceled) => Err(SendError::Canceled(value)),
      (Some(value), _) => Err(SendError::Timeout(value)),
      (None, _) => Ok(()),
    }
  }

  /// Attempts to send `value` without blocking.
  pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
    self.shared.try_send_core(value)
  }

  /// Receives the next value, blocking until one is available, the channel is
  /// closed and drained, or `deadline` elapses.
  ///
  /// # Errors
  ///
  /// - `RecvError::Closed` if the channel is closed and has no buffered values.
  /// - `RecvError::Timeout` if the deadline elapsed first.
  /// - `RecvError::Canceled` if the calling coroutine was canceled.
  pub fn receive(&self, deadline: Deadline) -> Result<T, RecvError> {
    let mut arm = RecvArm::new(&self.shared);
    let choice = selector::choose(&mut [&mut arm], deadline, false);
    match (arm.take_outcome(), choice) {
      (Some(outcome), _) => outcome,
      (None, Choice::Canceled) => Err(RecvError::Canceled),
      (None, _) => Err(RecvError::Timeout),
    }
  }

  /// Attempts to receive a value without blocking.
  pub fn try_receive(&self) -> Result<T, TryRecvError> {
    self.shared.try_recv_core()
  }

  /// Closes the channel.
  ///
  /// Every coroutine blocked in `send` fails with `SendError::Closed`; every
  /// coroutine blocked in `receive` on an empty channel fails with
  /// `RecvError::Closed`. Buffered values remain receivable.
  ///
  /// # Errors
  ///
  /// Returns `Err(CloseError)` if the channel was already closed; the call
  /// has no other effect in that case.
  pub fn close(&self) -> Result<(), CloseError> {
    if self.shared.close_core() {
      tracing::trace!(capacity = self.shared.capacity, "channel closed");
      Ok(())
    } else {
      Err(CloseError)
    }
  }

  /// Returns `true` once the channel has been closed, even if values remain
  /// buffered.
  pub fn is_closed(&self) -> bool {
    self.shared.lock().closed
  }

  /// Returns `true` if the channel is closed and holds no buffered values.
  pub fn is_drained(&self) -> bool {
    let guard = self.shared.lock();
    guard.closed && guard.queue.is_empty()
  }

  /// Returns the number of buffered values. Always `0` for rendezvous channels.
  #[inline]
  pub fn len(&self) -> usize {
    self.shared.lock().queue.len()
  }

  /// Returns `true` if no values are buffered.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the capacity of the buffer. `None` for unbounded channels.
  pub fn capacity(&self) -> Option<usize> {
    if self.shared.capacity == usize::MAX {
      None
    } else {
      Some(self.shared.capacity)
    }
  }

  /// Returns `true` if the buffer is full. For rendezvous channels this is
  /// always `true`.
  pub fn is_full(&self) -> bool {
    self.len() >= self.shared.capacity
  }

  /// Returns `true` if both handles refer to the same channel.
  pub fn same_channel(&self, other: &Channel<T>) -> bool {
    Arc::ptr_eq(&self.shared, &other.shared)
  }

  /// A blocking iterator over received values. It ends once the channel is
  /// closed and drained, or the calling coroutine is canceled.
  pub fn iter(&self) -> Iter<'_, T> {
    Iter { channel: self }
  }
}

/// Blocking iterator returned by [`Channel::iter`].
#[derive(Debug)]
pub struct Iter<'a, T> {
  channel: &'a Channel<T>,
}

impl<T> Iterator for Iter<'_, T> {
  type Item = T;

  fn next(&mut self) -> Option<T> {
    self.channel.receive(Deadline::never()).ok()
  }
}

impl<'a, T> IntoIterator for &'a Channel<T> {
  type Item = T;
  type IntoIter = Iter<'a, T>;

  fn into_iter(self) -> Iter<'a, T> {
    self.iter()
  }
}
