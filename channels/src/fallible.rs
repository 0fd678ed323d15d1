//! A channel whose slots carry either a value or an error.
//!
//! Used where one coroutine performs work that can fail and must report the
//! failure to a different coroutine. The producer sends the error as data
//! with [`FallibleChannel::send_error`]; the consumer gets it back from
//! [`FallibleChannel::receive`] as the `Err` side of the inner result and is
//! free to decide what to do with it. Nothing unwinds across coroutines.
//!
//! ```
//! use braid::{Deadline, FallibleChannel};
//!
//! let results: FallibleChannel<u32, String> = FallibleChannel::new(2);
//! results.send(1, Deadline::never()).unwrap();
//! results.send_error("disk full".to_string(), Deadline::never()).unwrap();
//!
//! assert_eq!(results.receive(Deadline::never()), Ok(Ok(1)));
//! assert_eq!(results.receive(Deadline::never()), Ok(Err("disk full".to_string())));
//! ```

use crate::channel::Channel;
use crate::deadline::Deadline;
use crate::error::{CloseError, RecvError, SendError, TryRecvError, TrySendError};

use std::fmt;

/// A cloneable handle to a channel of `Result<T, E>` slots.
pub struct FallibleChannel<T, E> {
  pub(crate) inner: Channel<Result<T, E>>,
}

impl<T, E> Clone for FallibleChannel<T, E> {
  fn clone(&self) -> Self {
    FallibleChannel {
      inner: self.inner.clone(),
    }
  }
}

impl<T, E> fmt::Debug for FallibleChannel<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FallibleChannel")
      .field("inner", &self.inner)
      .finish()
  }
}

/// Recovers the value from a slot this module filled with `Ok`.
pub(crate) fn value_of<T, E>(slot: Result<T, E>) -> T {
  match slot {
    Ok(value) => value,
    Err(_) => unreachable!("value send handed back an error slot"),
  }
}

/// Recovers the error from a slot this module filled with `Err`.
pub(crate) fn error_of<T, E>(slot: Result<T, E>) -> E {
  match slot {
    Err(error) => error,
    Ok(_) => unreachable!("error send handed back a value slot"),
  }
}

impl<T, E> FallibleChannel<T, E> {
  /// Creates a fallible channel buffering up to `capacity` slots.
  /// A capacity of `0` creates a rendezvous channel.
  pub fn new(capacity: usize) -> Self {
    FallibleChannel {
      inner: Channel::new(capacity),
    }
  }

  /// Creates a rendezvous fallible channel.
  pub fn rendezvous() -> Self {
    Self::new(0)
  }

  /// Sends a value. Blocks like [`Channel::send`].
  pub fn send(&self, value: T, deadline: Deadline) -> Result<(), SendError<T>> {
    self
      .inner
      .send(Ok(value), deadline)
      .map_err(|e| e.map(value_of))
  }

  /// Sends an error in place of a value. Blocks like [`Channel::send`].
  pub fn send_error(&self, error: E, deadline: Deadline) -> Result<(), SendError<E>> {
    self
      .inner
      .send(Err(error), deadline)
      .map_err(|e| e.map(error_of))
  }

  /// Attempts to send a value without blocking.
  pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
    self.inner.try_send(Ok(value)).map_err(|e| e.map(value_of))
  }

  /// Attempts to send an error without blocking.
  pub fn try_send_error(&self, error: E) -> Result<(), TrySendError<E>> {
    self.inner.try_send(Err(error)).map_err(|e| e.map(error_of))
  }

  /// Receives the next slot.
  ///
  /// The outer `Result` reports the channel operation (closed, timed out,
  /// canceled); the inner one is whatever the producer sent.
  pub fn receive(&self, deadline: Deadline) -> Result<Result<T, E>, RecvError> {
    self.inner.receive(deadline)
  }

  /// Attempts to receive the next slot without blocking.
  pub fn try_receive(&self) -> Result<Result<T, E>, TryRecvError> {
    self.inner.try_receive()
  }

  /// Closes the channel. See [`Channel::close`].
  pub fn close(&self) -> Result<(), CloseError> {
    self.inner.close()
  }

  /// Returns `true` once the channel has been closed.
  pub fn is_closed(&self) -> bool {
    self.inner.is_closed()
  }

  /// Returns the number of buffered slots.
  pub fn len(&self) -> usize {
    self.inner.len()
  }

  /// Returns `true` if no slots are buffered.
  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  /// Returns the capacity of the buffer. `None` for unbounded channels.
  pub fn capacity(&self) -> Option<usize> {
    self.inner.capacity()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::coroutine;
  use std::time::Duration;

  #[derive(Debug, PartialEq)]
  struct Failed(&'static str);

  #[test]
  fn errors_travel_as_data() {
    let chan: FallibleChannel<i32, Failed> = FallibleChannel::rendezvous();
    let producer = chan.clone();
    let worker = coroutine::spawn(move || {
      producer.send(1, Deadline::never()).unwrap();
      producer.send_error(Failed("step two"), Deadline::never()).unwrap();
      producer.close().unwrap();
    });

    assert_eq!(chan.receive(Deadline::never()), Ok(Ok(1)));
    assert_eq!(chan.receive(Deadline::never()), Ok(Err(Failed("step two"))));
    assert_eq!(chan.receive(Deadline::never()), Err(RecvError::Closed));
    worker.join().unwrap();
  }

  #[test]
  fn send_error_times_out_with_error_back() {
    let chan: FallibleChannel<(), Failed> = FallibleChannel::rendezvous();
    let err = chan
      .send_error(Failed("nobody listening"), Deadline::after(Duration::from_millis(20)))
      .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.into_inner(), Failed("nobody listening"));
  }

  #[test]
  fn try_variants() {
    let chan: FallibleChannel<u8, Failed> = FallibleChannel::new(1);
    chan.try_send(4).unwrap();
    assert_eq!(chan.try_send_error(Failed("x")), Err(TrySendError::Full(Failed("x"))));
    assert_eq!(chan.try_receive(), Ok(Ok(4)));
    chan.close().unwrap();
    assert_eq!(chan.try_send(5), Err(TrySendError::Closed(5)));
    assert_eq!(chan.try_receive(), Err(TryRecvError::Closed));
  }

  #[test]
  fn drains_buffer_after_close() {
    let chan: FallibleChannel<u8, Failed> = FallibleChannel::new(4);
    chan.send(1, Deadline::never()).unwrap();
    chan.send_error(Failed("late"), Deadline::never()).unwrap();
    chan.close().unwrap();
    assert_eq!(chan.len(), 2);
    assert_eq!(chan.receive(Deadline::immediately()), Ok(Ok(1)));
    assert_eq!(chan.receive(Deadline::immediately()), Ok(Err(Failed("late"))));
    assert_eq!(chan.receive(Deadline::immediately()), Err(RecvError::Closed));
  }
}
