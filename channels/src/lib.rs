//! CSP-style channels, coroutines and a multi-way select for Rust.
//!
//! Braid provides a single channel type that is unbuffered (rendezvous),
//! bounded or unbounded depending on how it is created, plus a fallible
//! variant whose slots carry either a value or an error. Every blocking
//! operation takes a [`Deadline`] and observes cancellation of the calling
//! [`Coroutine`]. [`select`] commits to exactly one of several channel
//! operations and timeouts, and [`for_select`] runs selects in a loop.

pub mod channel;
pub mod coroutine;
pub mod deadline;
pub mod error;
pub mod fallible;
pub mod select;

mod sync_util;

pub use channel::Channel;
pub use coroutine::{spawn, Coroutine};
pub use deadline::Deadline;
pub use error::{
  Canceled, CloseError, JoinError, RecvError, SendError, TryRecvError, TrySendError,
};
pub use fallible::FallibleChannel;
pub use select::{for_select, select, Select};
