// src/error.rs

use core::fmt;

// Implements `into_inner`, `Display` and `Error` for enums whose every variant
// carries the value that could not be delivered.
macro_rules! impl_error_for_enum_with_inner {
  (
    $enum_name:ident < $generic_param:ident >,
    $($variant:ident ( $message:expr ) ),+
    $(,)?
  ) => {
    impl<$generic_param> $enum_name<$generic_param> {
      /// Consumes the error, returning the value that was not delivered.
      #[inline]
      pub fn into_inner(self) -> $generic_param {
        match self {
          $( $enum_name::$variant(v) => v, )+
        }
      }

      /// Maps the carried value, keeping the failure kind.
      #[inline]
      pub fn map<U, F: FnOnce($generic_param) -> U>(self, f: F) -> $enum_name<U> {
        match self {
          $( $enum_name::$variant(v) => $enum_name::$variant(f(v)), )+
        }
      }
    }

    impl<$generic_param> fmt::Display for $enum_name<$generic_param> {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
          $( $enum_name::$variant(_) => f.write_str($message), )+
        }
      }
    }

    impl<$generic_param> fmt::Debug for $enum_name<$generic_param> {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
          $( $enum_name::$variant(_) => write!(f, "{}::{}(..)", stringify!($enum_name), stringify!($variant)), )+
        }
      }
    }

    impl<$generic_param> std::error::Error for $enum_name<$generic_param> {}
  };
}

/// Error returned by `try_send` when the value could not be handed over
/// immediately. The value is returned.
#[derive(PartialEq, Eq, Clone)]
pub enum TrySendError<T> {
  /// The buffer is full, or for a rendezvous channel no receiver is waiting.
  Full(T),
  /// The channel has been closed.
  Closed(T),
}

impl_error_for_enum_with_inner!(
  TrySendError<T>,
  Full("channel full"),
  Closed("channel closed"),
);

/// Error returned by a blocking `send`. The value is returned.
#[derive(PartialEq, Eq, Clone)]
pub enum SendError<T> {
  /// The channel was closed before the value was handed over.
  Closed(T),
  /// The deadline elapsed before a receiver or buffer slot became available.
  Timeout(T),
  /// The calling coroutine was canceled while blocked.
  Canceled(T),
}

impl_error_for_enum_with_inner!(
  SendError<T>,
  Closed("channel closed"),
  Timeout("send operation timed out"),
  Canceled("send operation canceled"),
);

impl<T> SendError<T> {
  /// Returns `true` if the failure was caused by the deadline elapsing.
  pub fn is_timeout(&self) -> bool {
    matches!(self, SendError::Timeout(_))
  }

  /// Returns `true` if the channel was closed.
  pub fn is_closed(&self) -> bool {
    matches!(self, SendError::Closed(_))
  }
}

/// Error returned by `try_receive` when no value could be taken immediately.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryRecvError {
  /// The channel is empty but still open.
  Empty,
  /// The channel is closed and every buffered value has been drained.
  Closed,
}
impl std::error::Error for TryRecvError {}
impl fmt::Display for TryRecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryRecvError::Empty => write!(f, "channel empty"),
      TryRecvError::Closed => write!(f, "channel closed (empty and closed)"),
    }
  }
}

/// Error returned by a blocking `receive`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvError {
  /// The channel is closed and every buffered value has been drained.
  Closed,
  /// The deadline elapsed before a value arrived.
  Timeout,
  /// The calling coroutine was canceled while blocked.
  Canceled,
}

impl RecvError {
  /// Returns `true` if the failure was caused by the deadline elapsing.
  pub fn is_timeout(&self) -> bool {
    matches!(self, RecvError::Timeout)
  }

  /// Returns `true` if the channel is closed and drained.
  pub fn is_closed(&self) -> bool {
    matches!(self, RecvError::Closed)
  }
}

impl std::error::Error for RecvError {}
impl fmt::Display for RecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RecvError::Closed => write!(f, "channel closed (empty and closed)"),
      RecvError::Timeout => write!(f, "receive operation timed out"),
      RecvError::Canceled => write!(f, "receive operation canceled"),
    }
  }
}

/// Error returned when attempting to close an already closed channel.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CloseError;
impl std::error::Error for CloseError {}
impl fmt::Display for CloseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "channel is already closed")
  }
}

/// The calling coroutine was canceled while it was suspended.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Canceled;
impl std::error::Error for Canceled {}
impl fmt::Display for Canceled {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "coroutine canceled")
  }
}

/// Error returned by [`Coroutine::join`](crate::coroutine::Coroutine::join).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JoinError {
  /// The coroutine's closure panicked.
  Panicked,
}
impl std::error::Error for JoinError {}
impl fmt::Display for JoinError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      JoinError::Panicked => write!(f, "coroutine panicked"),
    }
  }
}
