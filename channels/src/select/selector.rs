//! The wait primitive shared by every clause of one blocking operation, and
//! the engine that drives a set of clauses to exactly one outcome.
//!
//! ### Protocol
//!
//! 1.  **Poll**: every clause is tried once without blocking, in a rotated
//!     order. The first one that can complete does so, and nothing was ever
//!     registered, so there is nothing to retract.
//! 2.  **Register**: a fresh [`Selector`] is created and a waiter entry
//!     pointing at it is pushed onto each channel, under that channel's lock.
//!     Before pushing, the clause re-checks readiness under the lock; if the
//!     channel became ready, registration stops and the selector is
//!     *withdrawn* (CAS `WAITING -> WITHDRAWN`). A successful withdraw means
//!     nobody committed us, so all entries are retracted and we go back to
//!     step 1. A failed withdraw means a counterpart already committed one of
//!     our clauses.
//! 3.  **Park**: the thread parks until the selector leaves `WAITING`. The
//!     counterpart that wins the CAS on the selector is the only party that
//!     may complete the operation; it writes into the waiter's slot while
//!     still holding the channel lock, then unparks us. Deadlines and
//!     cancellation compete for the same CAS.
//! 4.  **Retract**: every clause removes its entries (taking each channel's
//!     lock, which also orders us after the winner's slot write), and the
//!     winning clause collects its result.
//!
//! A selector leaves `WAITING` exactly once, so at most one clause commits per
//! operation, and entries belonging to a selector in any other state are dead
//! and may be discarded by whoever finds them.

use crate::coroutine;
use crate::deadline::Deadline;
use crate::sync_util;

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

const WAITING: usize = usize::MAX;
const WITHDRAWN: usize = usize::MAX - 1;
const TIMED_OUT: usize = usize::MAX - 2;
const CANCELED: usize = usize::MAX - 3;

/// One blocking operation's commit point.
pub(crate) struct Selector {
  state: AtomicUsize,
  thread: Thread,
}

impl fmt::Debug for Selector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Selector")
      .field("state", &self.state.load(Ordering::Relaxed))
      .field("thread", &self.thread.id())
      .finish()
  }
}

impl Selector {
  fn new() -> Arc<Self> {
    Arc::new(Selector {
      state: AtomicUsize::new(WAITING),
      thread: thread::current(),
    })
  }

  /// Commits the operation to clause `case`. Only one call ever succeeds.
  #[inline]
  pub(crate) fn try_select(&self, case: usize) -> bool {
    debug_assert!(case < CANCELED);
    self.transition(case)
  }

  /// Returns `true` while no clause, deadline or cancellation has won.
  #[inline]
  pub(crate) fn is_waiting(&self) -> bool {
    self.state.load(Ordering::Acquire) == WAITING
  }

  /// Wakes the thread blocked on this selector.
  #[inline]
  pub(crate) fn unpark(&self) {
    sync_util::unpark_thread(&self.thread);
  }

  #[inline]
  fn transition(&self, to: usize) -> bool {
    self
      .state
      .compare_exchange(WAITING, to, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  #[inline]
  fn state(&self) -> usize {
    self.state.load(Ordering::Acquire)
  }
}

/// A channel operation that can take part in a blocking choice.
///
/// Implementors keep their own typed outcome; the engine only sees whether
/// and which arm completed.
pub(crate) trait Arm {
  /// Attempts the operation without blocking. Returns `true` if it completed
  /// (including completing with a "channel closed" result).
  fn try_fire(&mut self) -> bool;

  /// Pushes a waiter entry for `selector` with index `case`. Returns `false`
  /// without pushing if the channel is ready for this operation.
  fn register(&mut self, selector: &Arc<Selector>, case: usize) -> bool;

  /// Removes every entry pointing at `selector` and takes back anything the
  /// entries still own.
  fn unregister(&mut self, selector: &Arc<Selector>);

  /// Called on the arm whose entry was selected by a counterpart, after
  /// [`unregister`](Self::unregister).
  fn collect(&mut self);
}

/// How a blocking choice ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Choice {
  /// The arm at this index completed.
  Fired(usize),
  /// Nothing was ready and the caller asked not to block.
  Otherwise,
  /// The deadline elapsed first.
  TimedOut,
  /// The calling coroutine was canceled.
  Canceled,
}

thread_local! {
  static ROTATION: Cell<usize> = const { Cell::new(0) };
}

/// Start index for polling, rotated per call so no arm is always first.
fn next_start(len: usize) -> usize {
  if len <= 1 {
    return 0;
  }
  ROTATION.with(|r| {
    let n = r.get().wrapping_add(1);
    r.set(n);
    n % len
  })
}

/// Drives `arms` until exactly one completes, `deadline` elapses, or the
/// calling coroutine is canceled. With `otherwise` set, never blocks: if no
/// arm is ready and the deadline has not elapsed, returns
/// [`Choice::Otherwise`].
pub(crate) fn choose<A>(arms: &mut [&mut A], deadline: Deadline, otherwise: bool) -> Choice
where
  A: Arm + ?Sized,
{
  let len = arms.len();

  loop {
    if coroutine::is_canceled() {
      return Choice::Canceled;
    }

    // --- Phase 1: poll without registering ---
    let start = next_start(len);
    for k in 0..len {
      let i = (start + k) % len;
      if arms[i].try_fire() {
        return Choice::Fired(i);
      }
    }

    if deadline.has_elapsed() {
      return Choice::TimedOut;
    }
    if otherwise {
      return Choice::Otherwise;
    }

    // --- Phase 2: register on every arm ---
    let selector = Selector::new();
    let mut ready = false;
    for k in 0..len {
      let i = (start + k) % len;
      if !arms[i].register(&selector, i) {
        ready = true;
        break;
      }
    }

    if ready && selector.transition(WITHDRAWN) {
      tracing::trace!(arms = len, "select withdrew to re-poll a ready channel");
      for arm in arms.iter_mut() {
        arm.unregister(&selector);
      }
      coroutine::yield_now();
      continue;
    }

    // --- Phase 3: park until a counterpart, the deadline or a cancel wins ---
    while selector.is_waiting() {
      if coroutine::is_canceled() {
        selector.transition(CANCELED);
        continue;
      }
      if deadline.has_elapsed() {
        selector.transition(TIMED_OUT);
        continue;
      }
      sync_util::park_until(deadline);
    }

    // --- Phase 4: retract and collect ---
    for arm in arms.iter_mut() {
      arm.unregister(&selector);
    }

    return match selector.state() {
      TIMED_OUT => Choice::TimedOut,
      CANCELED => Choice::Canceled,
      case => {
        debug_assert!(case < len, "selector committed to an unknown case");
        arms[case].collect();
        Choice::Fired(case)
      }
    };
  }
}
