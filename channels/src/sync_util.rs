//! Utilities for synchronous blocking and parking.
//! Thin helpers around std::thread::park/unpark that understand deadlines.

use crate::deadline::Deadline;

use std::thread;

/// Parks the current thread until it is unparked or `deadline` elapses.
///
/// May return spuriously; callers re-check their wake condition in a loop.
#[inline]
pub(crate) fn park_until(deadline: Deadline) {
  match deadline.remaining() {
    None => thread::park(),
    Some(remaining) if remaining.is_zero() => {}
    Some(remaining) => thread::park_timeout(remaining),
  }
}

/// Unparks the given thread.
#[inline]
pub(crate) fn unpark_thread(thread: &thread::Thread) {
  thread.unpark();
}
