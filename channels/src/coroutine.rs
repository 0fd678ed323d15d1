//! Coroutines: units of concurrent execution that block cheaply and can be
//! canceled.
//!
//! Each coroutine runs its closure on a dedicated thread which parks while
//! suspended in a channel operation, a select, or [`sleep`]. Suspension points
//! poll the running coroutine's cancel flag, and [`Coroutine::cancel`] unparks
//! the thread so a canceled coroutine leaves its suspension point promptly
//! with a `Canceled` failure instead of staying blocked forever.
//!
//! Code not started through [`spawn`] (for instance a test's main thread) can
//! use every blocking API; it simply can never be canceled.

use crate::deadline::Deadline;
use crate::error::{Canceled, JoinError};
use crate::sync_util;

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Per-coroutine state shared between the running closure and its handle.
#[derive(Debug)]
pub(crate) struct Context {
  canceled: AtomicBool,
}

thread_local! {
  static CURRENT: RefCell<Option<Arc<Context>>> = const { RefCell::new(None) };
}

/// Returns `true` if the calling coroutine has been canceled.
pub fn is_canceled() -> bool {
  CURRENT.with(|current| {
    current
      .borrow()
      .as_ref()
      .is_some_and(|ctx| ctx.canceled.load(Ordering::Acquire))
  })
}

/// Suspends the calling coroutine until `deadline` elapses.
///
/// # Errors
///
/// Returns `Err(Canceled)` if the coroutine is canceled before the deadline.
pub fn sleep(deadline: Deadline) -> Result<(), Canceled> {
  loop {
    if is_canceled() {
      return Err(Canceled);
    }
    if deadline.has_elapsed() {
      return Ok(());
    }
    sync_util::park_until(deadline);
  }
}

/// Gives other coroutines a chance to run.
#[inline]
pub fn yield_now() {
  thread::yield_now();
}

/// Configures a coroutine before it is spawned.
#[derive(Debug, Default)]
pub struct Builder {
  name: Option<String>,
  stack_size: Option<usize>,
}

impl Builder {
  /// Creates a builder with default settings.
  pub fn new() -> Self {
    Self::default()
  }

  /// Names the coroutine. The name shows up in panic messages and logs.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Sets the stack size of the coroutine, in bytes.
  pub fn stack_size(mut self, size: usize) -> Self {
    self.stack_size = Some(size);
    self
  }

  /// Spawns the coroutine.
  ///
  /// # Errors
  ///
  /// Fails if the operating system refuses to create the underlying thread.
  pub fn spawn<F, T>(self, f: F) -> io::Result<Coroutine<T>>
  where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
  {
    let context = Arc::new(Context {
      canceled: AtomicBool::new(false),
    });

    let mut builder = thread::Builder::new();
    if let Some(name) = self.name {
      builder = builder.name(name);
    }
    if let Some(size) = self.stack_size {
      builder = builder.stack_size(size);
    }

    let inner = Arc::clone(&context);
    let handle = builder.spawn(move || {
      CURRENT.with(|current| *current.borrow_mut() = Some(inner));
      tracing::trace!(coroutine = ?thread::current().name(), "coroutine started");
      let output = f();
      tracing::trace!(coroutine = ?thread::current().name(), "coroutine finished");
      CURRENT.with(|current| current.borrow_mut().take());
      output
    })?;

    Ok(Coroutine { handle, context })
  }
}

/// Spawns a new coroutine running `f`.
///
/// # Panics
///
/// Panics if the underlying thread cannot be created; use [`Builder::spawn`]
/// to handle that case.
pub fn spawn<F, T>(f: F) -> Coroutine<T>
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  match Builder::new().spawn(f) {
    Ok(coroutine) => coroutine,
    Err(e) => panic!("failed to spawn coroutine: {e}"),
  }
}

/// An owned handle to a spawned coroutine.
///
/// Dropping the handle detaches the coroutine; it keeps running.
pub struct Coroutine<T> {
  handle: JoinHandle<T>,
  context: Arc<Context>,
}

impl<T> fmt::Debug for Coroutine<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Coroutine")
      .field("name", &self.name())
      .field("canceled", &self.is_canceled())
      .field("finished", &self.is_finished())
      .finish()
  }
}

impl<T> Coroutine<T> {
  /// Requests cancellation.
  ///
  /// If the coroutine is parked in a suspension point it is woken and that
  /// operation fails with a `Canceled` error; every later suspension point
  /// it reaches fails the same way. Canceling is idempotent.
  pub fn cancel(&self) {
    if !self.context.canceled.swap(true, Ordering::AcqRel) {
      tracing::trace!(coroutine = ?self.name(), "coroutine canceled");
    }
    sync_util::unpark_thread(self.handle.thread());
  }

  /// Returns `true` once [`cancel`](Self::cancel) has been called.
  pub fn is_canceled(&self) -> bool {
    self.context.canceled.load(Ordering::Acquire)
  }

  /// Returns `true` if the coroutine's closure has returned or panicked.
  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }

  /// The name given through [`Builder::name`], if any.
  pub fn name(&self) -> Option<&str> {
    self.handle.thread().name()
  }

  /// Waits for the coroutine to finish and returns its output.
  ///
  /// # Errors
  ///
  /// Returns `Err(JoinError::Panicked)` if the closure panicked.
  pub fn join(self) -> Result<T, JoinError> {
    self.handle.join().map_err(|_| JoinError::Panicked)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::{Duration, Instant};

  #[test]
  fn join_returns_output() {
    let co = spawn(|| 40 + 2);
    assert_eq!(co.join(), Ok(42));
  }

  #[test]
  fn join_reports_panic() {
    let co = Builder::new()
      .name("doomed")
      .spawn(|| -> () { panic!("boom") })
      .unwrap();
    assert_eq!(co.join(), Err(JoinError::Panicked));
  }

  #[test]
  fn main_thread_is_never_canceled() {
    assert!(!is_canceled());
    assert_eq!(sleep(Deadline::immediately()), Ok(()));
  }

  #[test]
  fn cancel_interrupts_sleep() {
    let co = spawn(|| sleep(Deadline::never()));
    thread::sleep(Duration::from_millis(20));
    co.cancel();
    assert!(co.is_canceled());
    assert_eq!(co.join().unwrap(), Err(Canceled));
  }

  #[test]
  fn sleep_waits_for_deadline() {
    let start = Instant::now();
    sleep(Deadline::after(Duration::from_millis(30))).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(30));
  }

  #[test]
  fn named_coroutine() {
    let co = Builder::new().name("worker-1").spawn(|| ()).unwrap();
    assert_eq!(co.name(), Some("worker-1"));
    co.join().unwrap();
  }
}
