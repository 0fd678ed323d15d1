// src/select/mod.rs

//! A multi-way select over heterogeneous channel operations.
//!
//! A [`Select`] collects clauses (receive from a channel, send to a channel,
//! send an error to a fallible channel, a timeout) plus an optional
//! `otherwise` handler, then [`wait`](Select::wait) commits to exactly one of
//! them and runs that clause's handler:
//!
//! 1. A clause whose operation can complete right now fires. Receiving from a
//!    closed and drained channel counts as ready; the handler is given
//!    `Err(RecvError::Closed)`. Sending to a closed channel likewise hands
//!    `Err(SendError::Closed(v))` to the handler.
//! 2. A timeout clause whose deadline has passed fires.
//! 3. Otherwise the `otherwise` handler runs, if one was given.
//! 4. Otherwise the caller blocks, registered on every clause at once, until
//!    one becomes ready. All other registrations are retracted before the
//!    handler runs.
//!
//! When several clauses are ready at once, which one fires is unspecified.
//! Values offered by send clauses that did not fire are dropped together
//! with the `Select`.
//!
//! ```
//! use braid::{select, Channel, Deadline};
//! use braid::error::RecvError;
//!
//! let numbers: Channel<u32> = Channel::new(1);
//! let words: Channel<&str> = Channel::new(1);
//! words.send("hello", Deadline::never()).unwrap();
//!
//! let got = select(|s| {
//!   s.receive(&numbers, |n: Result<u32, RecvError>| format!("number {}", n.unwrap()));
//!   s.receive(&words, |w: Result<&str, RecvError>| format!("word {}", w.unwrap()));
//! })
//! .unwrap();
//! assert_eq!(got, "word hello");
//! ```

pub(crate) mod selector;

use self::selector::{Arm, Choice, Selector};
use crate::channel::core::{RecvArm, SendArm};
use crate::channel::Channel;
use crate::deadline::Deadline;
use crate::error::{Canceled, RecvError, SendError};
use crate::fallible::{self, FallibleChannel};

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

/// A channel clause with its handler, type-erased down to the handler's
/// return type.
trait Clause<R>: Arm {
  fn fire(self: Box<Self>) -> R;
}

struct ReceiveClause<'a, T, F> {
  arm: RecvArm<'a, T>,
  handler: F,
}

impl<T, F> Arm for ReceiveClause<'_, T, F> {
  fn try_fire(&mut self) -> bool {
    self.arm.try_fire()
  }
  fn register(&mut self, selector: &Arc<Selector>, case: usize) -> bool {
    self.arm.register(selector, case)
  }
  fn unregister(&mut self, selector: &Arc<Selector>) {
    self.arm.unregister(selector)
  }
  fn collect(&mut self) {
    self.arm.collect()
  }
}

impl<T, F, R> Clause<R> for ReceiveClause<'_, T, F>
where
  F: FnOnce(Result<T, RecvError>) -> R,
{
  fn fire(mut self: Box<Self>) -> R {
    let outcome = self.arm.take_outcome().unwrap_or(Err(RecvError::Closed));
    (self.handler)(outcome)
  }
}

struct SendClause<'a, T, F> {
  arm: SendArm<'a, T>,
  handler: F,
}

impl<T, F> Arm for SendClause<'_, T, F> {
  fn try_fire(&mut self) -> bool {
    self.arm.try_fire()
  }
  fn register(&mut self, selector: &Arc<Selector>, case: usize) -> bool {
    self.arm.register(selector, case)
  }
  fn unregister(&mut self, selector: &Arc<Selector>) {
    self.arm.unregister(selector)
  }
  fn collect(&mut self) {
    self.arm.collect()
  }
}

impl<T, F, R> Clause<R> for SendClause<'_, T, F>
where
  F: FnOnce(Result<(), SendError<T>>) -> R,
{
  fn fire(mut self: Box<Self>) -> R {
    let outcome = match self.arm.take_outcome() {
      Some(outcome) => outcome,
      None => match self.arm.take_item() {
        Some(item) => Err(SendError::Closed(item)),
        None => Ok(()),
      },
    };
    (self.handler)(outcome)
  }
}

type Handler<'a, R> = Box<dyn FnOnce() -> R + 'a>;

/// One candidate operation of a select.
enum Case<'a, R> {
  Receive(Box<dyn Clause<R> + 'a>),
  Send(Box<dyn Clause<R> + 'a>),
  SendError(Box<dyn Clause<R> + 'a>),
  Timeout(Deadline, Handler<'a, R>),
}

impl<'a, R> Case<'a, R> {
  fn clause(&mut self) -> Option<&mut (dyn Clause<R> + 'a)> {
    match self {
      Case::Receive(c) | Case::Send(c) | Case::SendError(c) => Some(&mut **c),
      Case::Timeout(..) => None,
    }
  }

  fn fire(self) -> R {
    match self {
      Case::Receive(c) | Case::Send(c) | Case::SendError(c) => c.fire(),
      Case::Timeout(_, handler) => handler(),
    }
  }
}

/// A builder for a single select. Every handler returns an `R`, which
/// [`wait`](Self::wait) passes back to the caller.
pub struct Select<'a, R> {
  cases: Vec<Case<'a, R>>,
  otherwise: Option<Handler<'a, R>>,
}

impl<R> fmt::Debug for Select<'_, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kinds: Vec<&str> = self
      .cases
      .iter()
      .map(|c| match c {
        Case::Receive(_) => "receive",
        Case::Send(_) => "send",
        Case::SendError(_) => "send_error",
        Case::Timeout(..) => "timeout",
      })
      .collect();
    f.debug_struct("Select")
      .field("cases", &kinds)
      .field("otherwise", &self.otherwise.is_some())
      .finish()
  }
}

impl<R> Default for Select<'_, R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<'a, R> Select<'a, R> {
  /// Creates an empty select.
  pub fn new() -> Self {
    Select {
      cases: Vec::new(),
      otherwise: None,
    }
  }

  /// Adds a clause receiving from `channel`.
  pub fn receive<T, F>(&mut self, channel: &'a Channel<T>, handler: F) -> &mut Self
  where
    T: 'a,
    F: FnOnce(Result<T, RecvError>) -> R + 'a,
  {
    self.cases.push(Case::Receive(Box::new(ReceiveClause {
      arm: RecvArm::new(&channel.shared),
      handler,
    })));
    self
  }

  /// Adds a clause sending `value` to `channel`.
  pub fn send<T, F>(&mut self, channel: &'a Channel<T>, value: T, handler: F) -> &mut Self
  where
    T: 'a,
    F: FnOnce(Result<(), SendError<T>>) -> R + 'a,
  {
    self.cases.push(Case::Send(Box::new(SendClause {
      arm: SendArm::new(&channel.shared, value),
      handler,
    })));
    self
  }

  /// Adds a clause receiving a value-or-error slot from `channel`.
  pub fn receive_fallible<T, E, F>(
    &mut self,
    channel: &'a FallibleChannel<T, E>,
    handler: F,
  ) -> &mut Self
  where
    T: 'a,
    E: 'a,
    F: FnOnce(Result<Result<T, E>, RecvError>) -> R + 'a,
  {
    self.cases.push(Case::Receive(Box::new(ReceiveClause {
      arm: RecvArm::new(&channel.inner.shared),
      handler,
    })));
    self
  }

  /// Adds a clause sending `value` to a fallible channel.
  pub fn send_fallible<T, E, F>(
    &mut self,
    channel: &'a FallibleChannel<T, E>,
    value: T,
    handler: F,
  ) -> &mut Self
  where
    T: 'a,
    E: 'a,
    F: FnOnce(Result<(), SendError<T>>) -> R + 'a,
  {
    self.cases.push(Case::Send(Box::new(SendClause {
      arm: SendArm::new(&channel.inner.shared, Ok(value)),
      handler: move |r: Result<(), SendError<Result<T, E>>>| {
        handler(r.map_err(|e| e.map(fallible::value_of)))
      },
    })));
    self
  }

  /// Adds a clause sending `error` to a fallible channel.
  pub fn send_error<T, E, F>(
    &mut self,
    channel: &'a FallibleChannel<T, E>,
    error: E,
    handler: F,
  ) -> &mut Self
  where
    T: 'a,
    E: 'a,
    F: FnOnce(Result<(), SendError<E>>) -> R + 'a,
  {
    self.cases.push(Case::SendError(Box::new(SendClause {
      arm: SendArm::new(&channel.inner.shared, Err(error)),
      handler: move |r: Result<(), SendError<Result<T, E>>>| {
        handler(r.map_err(|e| e.map(fallible::error_of)))
      },
    })));
    self
  }

  /// Adds a clause that fires once `deadline` has passed. A deadline already
  /// in the past makes the clause ready immediately.
  pub fn timeout<F>(&mut self, deadline: Deadline, handler: F) -> &mut Self
  where
    F: FnOnce() -> R + 'a,
  {
    self.cases.push(Case::Timeout(deadline, Box::new(handler)));
    self
  }

  /// Sets the handler that runs when no clause is ready. With it, `wait`
  /// never blocks. A later call replaces an earlier one.
  pub fn otherwise<F>(&mut self, handler: F) -> &mut Self
  where
    F: FnOnce() -> R + 'a,
  {
    self.otherwise = Some(Box::new(handler));
    self
  }

  /// Returns `true` if no clause and no `otherwise` handler were added.
  pub fn is_empty(&self) -> bool {
    self.cases.is_empty() && self.otherwise.is_none()
  }

  /// Commits to exactly one clause and returns its handler's result.
  ///
  /// A select with no clauses, no timeout and no `otherwise` blocks until the
  /// calling coroutine is canceled.
  ///
  /// # Errors
  ///
  /// Returns `Err(Canceled)` if the calling coroutine is canceled while
  /// waiting; no handler runs in that case.
  pub fn wait(mut self) -> Result<R, Canceled> {
    // Earliest timeout clause; it is the one that fires when time runs out.
    let mut deadline = Deadline::Never;
    let mut timeout_case = None;
    for (i, case) in self.cases.iter().enumerate() {
      if let Case::Timeout(d, _) = case {
        if timeout_case.is_none() || *d < deadline {
          deadline = *d;
          timeout_case = Some(i);
        }
      }
    }

    let mut positions = Vec::with_capacity(self.cases.len());
    let choice = {
      let mut arms: Vec<&mut (dyn Clause<R> + 'a)> = Vec::with_capacity(self.cases.len());
      for (i, case) in self.cases.iter_mut().enumerate() {
        if let Some(clause) = case.clause() {
          positions.push(i);
          arms.push(clause);
        }
      }
      selector::choose(&mut arms, deadline, self.otherwise.is_some())
    };

    let chosen = match choice {
      Choice::Fired(arm) => positions[arm],
      Choice::TimedOut => match timeout_case {
        Some(i) => i,
        // Only timeout clauses set the deadline.
        None => return Err(Canceled),
      },
      Choice::Otherwise => {
        return match self.otherwise.take() {
          Some(handler) => Ok(handler()),
          None => Err(Canceled),
        };
      }
      Choice::Canceled => return Err(Canceled),
    };

    Ok(self.cases.swap_remove(chosen).fire())
  }
}

/// Builds a [`Select`] with `build` and waits on it.
pub fn select<'a, R, F>(build: F) -> Result<R, Canceled>
where
  F: FnOnce(&mut Select<'a, R>),
{
  let mut select = Select::new();
  build(&mut select);
  select.wait()
}

/// Runs selects in a loop until `done` breaks out of it.
///
/// Each iteration builds a fresh [`Select`] with `build`, waits on it, and
/// hands the chosen handler's result to `done`. The loop ends with the value
/// carried by the first `ControlFlow::Break`.
///
/// # Errors
///
/// Returns `Err(Canceled)` if the calling coroutine is canceled.
pub fn for_select<'a, R, B, F, D>(mut build: F, mut done: D) -> Result<B, Canceled>
where
  F: FnMut(&mut Select<'a, R>),
  D: FnMut(R) -> ControlFlow<B>,
{
  loop {
    let mut select = Select::new();
    build(&mut select);
    if let ControlFlow::Break(value) = done(select.wait()?) {
      return Ok(value);
    }
  }
}
