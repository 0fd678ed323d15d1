// src/channel/core.rs

//! The core shared data structures and logic for [`Channel`](super::Channel).
//!
//! ### Design Principles:
//!
//! 1.  **Central Mutex**: A `parking_lot::Mutex` guards the buffer, the closed
//!     flag and both waiter queues. Every send, receive, close and select
//!     registration is one critical section on it.
//! 2.  **Waiters point at selectors**: a parked party is represented by an
//!     entry holding the [`Selector`] of its blocking operation and a shared
//!     slot. Whoever wins the selector's CAS completes the hand-off through
//!     the slot while still holding this channel's lock.
//! 3.  **Dead entries are skipped**: an entry whose selector already left the
//!     waiting state belongs to an operation that committed elsewhere, timed
//!     out, or was canceled. Matching code drops such entries as it finds them.

use crate::error::{RecvError, SendError, TryRecvError, TrySendError};
use crate::select::selector::{Arm, Selector};

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// What a parked receiver is handed by the party that selected it.
#[derive(Debug)]
pub(crate) enum Delivery<T> {
  Value(T),
  Closed,
}

type RecvSlot<T> = Arc<Mutex<Option<Delivery<T>>>>;
type SendSlot<T> = Arc<Mutex<Option<T>>>;

/// A parked receive operation.
pub(crate) struct RecvWaiter<T> {
  selector: Arc<Selector>,
  case: usize,
  slot: RecvSlot<T>,
}

/// A parked send operation. The value stays in the slot until a receiver
/// (or a buffer refill) takes it; if it is still there when the sender wakes,
/// the channel was closed.
pub(crate) struct SendWaiter<T> {
  selector: Arc<Selector>,
  case: usize,
  slot: SendSlot<T>,
}

/// The mutex-protected state of a channel.
pub(crate) struct ChanInternal<T> {
  /// Buffered values, oldest first. Always empty for rendezvous channels.
  pub(crate) queue: VecDeque<T>,
  pub(crate) waiting_senders: VecDeque<SendWaiter<T>>,
  pub(crate) waiting_receivers: VecDeque<RecvWaiter<T>>,
  pub(crate) closed: bool,
}

/// The shared owner of a channel's state, wrapped in an `Arc` by every handle.
pub(crate) struct ChanShared<T> {
  pub(crate) internal: Mutex<ChanInternal<T>>,
  /// `0` for rendezvous, `usize::MAX` for unbounded.
  pub(crate) capacity: usize,
}

impl<T> fmt::Debug for ChanShared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let guard = self.internal.lock();
    f.debug_struct("ChanShared")
      .field("capacity", &self.capacity)
      .field("len", &guard.queue.len())
      .field("waiting_senders", &guard.waiting_senders.len())
      .field("waiting_receivers", &guard.waiting_receivers.len())
      .field("closed", &guard.closed)
      .finish()
  }
}

impl<T> ChanShared<T> {
  pub(crate) fn new(capacity: usize) -> Self {
    ChanShared {
      internal: Mutex::new(ChanInternal {
        queue: VecDeque::with_capacity(capacity.min(32)),
        waiting_senders: VecDeque::new(),
        waiting_receivers: VecDeque::new(),
        closed: false,
      }),
      capacity,
    }
  }

  #[inline]
  pub(crate) fn lock(&self) -> MutexGuard<'_, ChanInternal<T>> {
    self.internal.lock()
  }

  /// Attempts to hand `item` over without blocking:
  /// 1. To a parked receiver, directly into its slot.
  /// 2. Into the buffer if there is space.
  pub(crate) fn try_send_core(&self, item: T) -> Result<(), TrySendError<T>> {
    let mut guard = self.lock();

    if guard.closed {
      return Err(TrySendError::Closed(item));
    }

    // --- Priority 1: a parked receiver ---
    while let Some(waiter) = guard.waiting_receivers.pop_front() {
      if waiter.selector.try_select(waiter.case) {
        *waiter.slot.lock() = Some(Delivery::Value(item));
        waiter.selector.unpark();
        return Ok(());
      }
      // Dead entry, already dropped.
    }

    // --- Priority 2: buffer space ---
    if guard.queue.len() < self.capacity {
      guard.queue.push_back(item);
      return Ok(());
    }

    Err(TrySendError::Full(item))
  }

  /// Attempts to take a value without blocking:
  /// 1. From the buffer, then refill the freed slot from a parked sender.
  /// 2. Directly from a parked sender (rendezvous).
  /// 3. Reports `Closed` only once both are exhausted.
  pub(crate) fn try_recv_core(&self) -> Result<T, TryRecvError> {
    let mut guard = self.lock();

    // --- Priority 1: the buffer ---
    if let Some(item) = guard.queue.pop_front() {
      while let Some(waiter) = guard.waiting_senders.pop_front() {
        if waiter.selector.try_select(waiter.case) {
          if let Some(value) = waiter.slot.lock().take() {
            guard.queue.push_back(value);
          }
          waiter.selector.unpark();
          break;
        }
      }
      return Ok(item);
    }

    // --- Priority 2: a parked sender ---
    while let Some(waiter) = guard.waiting_senders.pop_front() {
      if waiter.selector.try_select(waiter.case) {
        let value = waiter.slot.lock().take();
        waiter.selector.unpark();
        if let Some(value) = value {
          return Ok(value);
        }
      }
    }

    if guard.closed {
      Err(TryRecvError::Closed)
    } else {
      Err(TryRecvError::Empty)
    }
  }

  /// Marks the channel closed and wakes every parked party. Returns `false`
  /// if it was already closed.
  pub(crate) fn close_core(&self) -> bool {
    let mut guard = self.lock();
    if guard.closed {
      return false;
    }
    guard.closed = true;

    let receivers = std::mem::take(&mut guard.waiting_receivers);
    for waiter in receivers {
      if waiter.selector.try_select(waiter.case) {
        *waiter.slot.lock() = Some(Delivery::Closed);
        waiter.selector.unpark();
      }
    }
    // Senders keep their value in the slot; finding it there on wake-up is
    // how they learn the channel closed.
    let senders = std::mem::take(&mut guard.waiting_senders);
    for waiter in senders {
      if waiter.selector.try_select(waiter.case) {
        waiter.selector.unpark();
      }
    }
    true
  }
}

impl<T> ChanInternal<T> {
  /// A live parked receiver exists that does not belong to `me`.
  fn has_receiver(&mut self, me: &Arc<Selector>) -> bool {
    self.waiting_receivers.retain(|w| w.selector.is_waiting());
    self
      .waiting_receivers
      .iter()
      .any(|w| !Arc::ptr_eq(&w.selector, me))
  }

  /// A live parked sender exists that does not belong to `me`.
  fn has_sender(&mut self, me: &Arc<Selector>) -> bool {
    self.waiting_senders.retain(|w| w.selector.is_waiting());
    self
      .waiting_senders
      .iter()
      .any(|w| !Arc::ptr_eq(&w.selector, me))
  }
}

// --- Arms ---

/// A receive operation on one channel, as seen by the select engine.
pub(crate) struct RecvArm<'a, T> {
  shared: &'a ChanShared<T>,
  slot: Option<RecvSlot<T>>,
  outcome: Option<Result<T, RecvError>>,
}

impl<'a, T> RecvArm<'a, T> {
  pub(crate) fn new(shared: &'a ChanShared<T>) -> Self {
    RecvArm {
      shared,
      slot: None,
      outcome: None,
    }
  }

  /// The completed result. Only meaningful after the engine reported this
  /// arm as fired.
  pub(crate) fn take_outcome(&mut self) -> Option<Result<T, RecvError>> {
    self.outcome.take()
  }
}

impl<T> Arm for RecvArm<'_, T> {
  fn try_fire(&mut self) -> bool {
    match self.shared.try_recv_core() {
      Ok(item) => {
        self.outcome = Some(Ok(item));
        true
      }
      Err(TryRecvError::Closed) => {
        self.outcome = Some(Err(RecvError::Closed));
        true
      }
      Err(TryRecvError::Empty) => false,
    }
  }

  fn register(&mut self, selector: &Arc<Selector>, case: usize) -> bool {
    let mut guard = self.shared.lock();
    if guard.closed || !guard.queue.is_empty() || guard.has_sender(selector) {
      return false;
    }
    let slot: RecvSlot<T> = Arc::new(Mutex::new(None));
    guard.waiting_receivers.push_back(RecvWaiter {
      selector: Arc::clone(selector),
      case,
      slot: Arc::clone(&slot),
    });
    self.slot = Some(slot);
    true
  }

  fn unregister(&mut self, selector: &Arc<Selector>) {
    let mut guard = self.shared.lock();
    guard
      .waiting_receivers
      .retain(|w| !Arc::ptr_eq(&w.selector, selector));
  }

  fn collect(&mut self) {
    let delivery = self.slot.take().and_then(|slot| slot.lock().take());
    debug_assert!(delivery.is_some(), "selected receiver found an empty slot");
    self.outcome = Some(match delivery {
      Some(Delivery::Value(item)) => Ok(item),
      Some(Delivery::Closed) | None => Err(RecvError::Closed),
    });
  }
}

/// A send operation on one channel, as seen by the select engine.
pub(crate) struct SendArm<'a, T> {
  shared: &'a ChanShared<T>,
  item: Option<T>,
  slot: Option<SendSlot<T>>,
  outcome: Option<Result<(), SendError<T>>>,
}

impl<'a, T> SendArm<'a, T> {
  pub(crate) fn new(shared: &'a ChanShared<T>, item: T) -> Self {
    SendArm {
      shared,
      item: Some(item),
      slot: None,
      outcome: None,
    }
  }

  /// The completed result, if the arm fired.
  pub(crate) fn take_outcome(&mut self) -> Option<Result<(), SendError<T>>> {
    self.outcome.take()
  }

  /// Takes back the value of an arm that did not fire.
  pub(crate) fn take_item(&mut self) -> Option<T> {
    self.item.take()
  }
}

impl<T> Arm for SendArm<'_, T> {
  fn try_fire(&mut self) -> bool {
    let Some(item) = self.item.take() else {
      return false;
    };
    match self.shared.try_send_core(item) {
      Ok(()) => {
        self.outcome = Some(Ok(()));
        true
      }
      Err(TrySendError::Closed(item)) => {
        self.outcome = Some(Err(SendError::Closed(item)));
        true
      }
      Err(TrySendError::Full(item)) => {
        self.item = Some(item);
        false
      }
    }
  }

  fn register(&mut self, selector: &Arc<Selector>, case: usize) -> bool {
    let mut guard = self.shared.lock();
    if guard.closed || guard.queue.len() < self.shared.capacity || guard.has_receiver(selector) {
      return false;
    }
    let slot: SendSlot<T> = Arc::new(Mutex::new(self.item.take()));
    guard.waiting_senders.push_back(SendWaiter {
      selector: Arc::clone(selector),
      case,
      slot: Arc::clone(&slot),
    });
    self.slot = Some(slot);
    true
  }

  fn unregister(&mut self, selector: &Arc<Selector>) {
    {
      let mut guard = self.shared.lock();
      guard
        .waiting_senders
        .retain(|w| !Arc::ptr_eq(&w.selector, selector));
    }
    if let Some(slot) = self.slot.take() {
      if let Some(item) = slot.lock().take() {
        self.item = Some(item);
      }
    }
  }

  fn collect(&mut self) {
    // A value still owned by the arm after retraction was never taken: the
    // sender was woken by close.
    self.outcome = Some(match self.item.take() {
      Some(item) => Err(SendError::Closed(item)),
      None => Ok(()),
    });
  }
}
