//! A bounded pool of reusable connections.
//!
//! ### Design Principles:
//!
//! 1.  **Counters under one lock**: `borrowed`, the idle stack, the waiter
//!     count and the closed flag live in a single `parking_lot::Mutex`. The
//!     invariant `borrowed + available.len() <= max_size` is checked and
//!     updated only while holding it.
//! 2.  **Reserve, then create**: growing the pool reserves a slot (bumps
//!     `borrowed`) under the lock and runs the factory outside it. A failed
//!     creation gives the slot back.
//! 3.  **Wake-ups are hints**: a caller that finds the pool exhausted waits on
//!     a `braid` channel used purely as a signal. Returns and disposals post a
//!     token when someone is waiting; a woken caller always re-checks the
//!     pool, so a dropped or stale token costs at most one extra loop.

use crate::config::PoolConfig;
use crate::error::{BoxError, PoolError};

use braid::error::RecvError;
use braid::{coroutine, Channel, Deadline};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Creates and closes the connections of a [`Pool`].
pub trait Manage: Send + Sync + 'static {
  type Connection: Send + 'static;

  /// Opens a new connection, giving up once `deadline` passes.
  fn create(&self, deadline: Deadline) -> Result<Self::Connection, BoxError>;

  /// Closes a connection the pool is done with. The default just drops it.
  fn close(&self, connection: Self::Connection, deadline: Deadline) {
    let _ = deadline;
    drop(connection);
  }
}

/// A [`Manage`] implementation backed by closures. See [`manager_fn`].
pub struct FnManager<F, C, K = fn(C, Deadline)> {
  create: F,
  close: K,
  _connection: PhantomData<fn() -> C>,
}

impl<F, C, K> fmt::Debug for FnManager<F, C, K> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnManager").finish_non_exhaustive()
  }
}

impl<F, C, K> FnManager<F, C, K> {
  /// Replaces the close hook. `close` receives every connection the pool
  /// discards together with a deadline derived from
  /// [`PoolConfig::close_timeout`].
  pub fn on_close<K2>(self, close: K2) -> FnManager<F, C, K2>
  where
    K2: Fn(C, Deadline) + Send + Sync + 'static,
  {
    FnManager {
      create: self.create,
      close,
      _connection: PhantomData,
    }
  }
}

impl<F, C, K> Manage for FnManager<F, C, K>
where
  F: Fn(Deadline) -> Result<C, BoxError> + Send + Sync + 'static,
  K: Fn(C, Deadline) + Send + Sync + 'static,
  C: Send + 'static,
{
  type Connection = C;

  fn create(&self, deadline: Deadline) -> Result<C, BoxError> {
    (self.create)(deadline)
  }

  fn close(&self, connection: C, deadline: Deadline) {
    (self.close)(connection, deadline)
  }
}

fn drop_connection<C>(connection: C, _deadline: Deadline) {
  drop(connection);
}

/// Builds a [`Manage`] from a factory closure. Connections are closed by
/// dropping them unless a hook is added with [`FnManager::on_close`].
pub fn manager_fn<F, C>(create: F) -> FnManager<F, C>
where
  F: Fn(Deadline) -> Result<C, BoxError> + Send + Sync + 'static,
  C: Send + 'static,
{
  FnManager {
    create,
    close: drop_connection::<C>,
    _connection: PhantomData,
  }
}

/// A point-in-time view of a pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
  pub borrowed: usize,
  pub available: usize,
  pub waiting: usize,
  pub max_size: usize,
}

struct PoolState<C> {
  available: Vec<C>,
  borrowed: usize,
  waiters: usize,
  closed: bool,
}

struct PoolInner<M: Manage> {
  manager: M,
  config: PoolConfig,
  state: Mutex<PoolState<M::Connection>>,
  wakeups: Channel<()>,
}

impl<M: Manage> PoolInner<M> {
  fn lock(&self) -> MutexGuard<'_, PoolState<M::Connection>> {
    self.state.lock()
  }

  /// Posts a best-effort wake-up. Must be called with the state lock held so
  /// the waiter count is accurate.
  fn notify(&self, state: &PoolState<M::Connection>) {
    if state.waiters > 0 {
      // A full signal buffer already holds enough tokens to wake everyone.
      let _ = self.wakeups.try_send(());
    }
  }

  fn close_deadline(&self) -> Deadline {
    Deadline::after(self.config.close_timeout)
  }

  fn put_back(&self, connection: M::Connection) {
    let mut state = self.lock();
    state.borrowed -= 1;
    if state.closed {
      drop(state);
      tracing::debug!("connection released after pool close, closing it");
      self.manager.close(connection, self.close_deadline());
      return;
    }
    state.available.push(connection);
    self.notify(&state);
    tracing::trace!(
      borrowed = state.borrowed,
      available = state.available.len(),
      "connection returned to pool"
    );
  }

  /// Frees the slot of a connection that leaves the pool for good.
  fn forget(&self) {
    let mut state = self.lock();
    state.borrowed -= 1;
    self.notify(&state);
  }
}

/// A bounded pool of connections produced by a [`Manage`] factory.
///
/// Cloning a `Pool` yields another handle to the same pool.
pub struct Pool<M: Manage> {
  inner: Arc<PoolInner<M>>,
}

impl<M: Manage> Clone for Pool<M> {
  fn clone(&self) -> Self {
    Pool {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<M: Manage> fmt::Debug for Pool<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pool")
      .field("config", &self.inner.config)
      .field("status", &self.status())
      .finish()
  }
}

impl<M: Manage> Pool<M> {
  /// Creates a pool and opens `config.min_size` connections up front.
  ///
  /// # Errors
  ///
  /// Returns [`PoolError::Config`] for an invalid size range and
  /// [`PoolError::Create`] if any warm-up connection fails; connections
  /// opened before the failure are closed again.
  pub fn new(manager: M, config: PoolConfig) -> Result<Self, PoolError> {
    config.validate()?;

    let mut warm = Vec::with_capacity(config.min_size);
    for _ in 0..config.min_size {
      match manager.create(Deadline::after(config.create_timeout)) {
        Ok(connection) => warm.push(connection),
        Err(e) => {
          tracing::warn!(error = %e, created = warm.len(), "pool warm-up failed");
          for connection in warm {
            manager.close(connection, Deadline::after(config.close_timeout));
          }
          return Err(PoolError::Create(e));
        }
      }
    }
    tracing::debug!(
      min_size = config.min_size,
      max_size = config.max_size,
      "pool created"
    );

    let wakeups = Channel::new(config.max_size);
    Ok(Pool {
      inner: Arc::new(PoolInner {
        manager,
        config,
        state: Mutex::new(PoolState {
          available: warm,
          borrowed: 0,
          waiters: 0,
          closed: false,
        }),
        wakeups,
      }),
    })
  }

  /// Borrows a connection.
  ///
  /// An idle connection is reused if there is one. Otherwise a new one is
  /// created if the pool is below `max_size`. Otherwise the caller waits
  /// until a connection is returned or disposed, or until `deadline`.
  ///
  /// # Errors
  ///
  /// - [`PoolError::Timeout`] if `deadline` passes while waiting.
  /// - [`PoolError::Closed`] if the pool is or becomes closed.
  /// - [`PoolError::Canceled`] if the calling coroutine is canceled.
  /// - [`PoolError::Create`] with the factory's error, unchanged.
  pub fn borrow(&self, deadline: Deadline) -> Result<Pooled<M>, PoolError> {
    let inner = &self.inner;
    loop {
      if coroutine::is_canceled() {
        return Err(PoolError::Canceled);
      }

      let mut state = inner.lock();
      if state.closed {
        return Err(PoolError::Closed);
      }

      if let Some(connection) = state.available.pop() {
        state.borrowed += 1;
        return Ok(Pooled::new(connection, self.clone()));
      }

      if state.borrowed + state.available.len() < inner.config.max_size {
        state.borrowed += 1;
        drop(state);
        return self.create_reserved(deadline);
      }

      state.waiters += 1;
      drop(state);
      tracing::trace!("pool exhausted, waiting for a connection");
      let woke = inner.wakeups.receive(deadline);
      inner.lock().waiters -= 1;

      match woke {
        Ok(()) => continue,
        Err(RecvError::Timeout) => return Err(PoolError::Timeout),
        Err(RecvError::Canceled) => return Err(PoolError::Canceled),
        Err(RecvError::Closed) => return Err(PoolError::Closed),
      }
    }
  }

  /// Runs the factory for a slot already counted in `borrowed`.
  fn create_reserved(&self, deadline: Deadline) -> Result<Pooled<M>, PoolError> {
    let inner = &self.inner;
    let create_deadline = deadline.min(Deadline::after(inner.config.create_timeout));
    match inner.manager.create(create_deadline) {
      Ok(connection) => {
        tracing::debug!("pool grew by one connection");
        Ok(Pooled::new(connection, self.clone()))
      }
      Err(e) => {
        tracing::warn!(error = %e, "connection creation failed");
        inner.forget();
        Err(PoolError::Create(e))
      }
    }
  }

  /// Returns the current counters.
  pub fn status(&self) -> PoolStatus {
    let state = self.inner.lock();
    PoolStatus {
      borrowed: state.borrowed,
      available: state.available.len(),
      waiting: state.waiters,
      max_size: self.inner.config.max_size,
    }
  }

  pub fn config(&self) -> &PoolConfig {
    &self.inner.config
  }

  pub fn is_closed(&self) -> bool {
    self.inner.lock().closed
  }

  /// Closes the pool.
  ///
  /// Every idle connection is closed with the configured close timeout,
  /// waiting borrowers fail with [`PoolError::Closed`], and later borrows are
  /// refused. Borrowed connections are closed when they come back. Closing
  /// an already closed pool does nothing.
  pub fn close(&self) {
    let idle = {
      let mut state = self.inner.lock();
      if state.closed {
        return;
      }
      state.closed = true;
      std::mem::take(&mut state.available)
    };
    let _ = self.inner.wakeups.close();
    tracing::debug!(idle = idle.len(), "closing pool");
    for connection in idle {
      self.inner.manager.close(connection, self.inner.close_deadline());
    }
  }
}

/// A connection borrowed from a [`Pool`].
///
/// Give it back with [`release`](Self::release) once it is known to be
/// healthy. Dropping it without a decision disposes of it, so a connection
/// that may be broken is never handed to another borrower.
pub struct Pooled<M: Manage> {
  connection: Option<M::Connection>,
  pool: Pool<M>,
}

impl<M: Manage> fmt::Debug for Pooled<M>
where
  M::Connection: fmt::Debug,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pooled")
      .field("connection", &self.connection)
      .finish()
  }
}

impl<M: Manage> Pooled<M> {
  fn new(connection: M::Connection, pool: Pool<M>) -> Self {
    Pooled {
      connection: Some(connection),
      pool,
    }
  }

  /// Returns the connection to the pool for reuse.
  pub fn release(mut self) {
    if let Some(connection) = self.connection.take() {
      self.pool.inner.put_back(connection);
    }
  }

  /// Closes the connection and frees its slot. It is never reused.
  pub fn dispose(mut self) {
    self.dispose_inner();
  }

  /// Takes the connection out of the pool's care. Its slot is freed as if it
  /// had been disposed, but the connection is not closed.
  pub fn detach(mut self) -> M::Connection {
    let connection = self.take();
    self.pool.inner.forget();
    connection
  }

  fn take(&mut self) -> M::Connection {
    match self.connection.take() {
      Some(connection) => connection,
      None => unreachable!("pooled connection already taken"),
    }
  }

  fn dispose_inner(&mut self) {
    if let Some(connection) = self.connection.take() {
      let inner = &self.pool.inner;
      inner.forget();
      tracing::debug!("disposing pooled connection");
      inner.manager.close(connection, inner.close_deadline());
    }
  }
}

impl<M: Manage> Deref for Pooled<M> {
  type Target = M::Connection;

  fn deref(&self) -> &M::Connection {
    match &self.connection {
      Some(connection) => connection,
      None => unreachable!("pooled connection already taken"),
    }
  }
}

impl<M: Manage> DerefMut for Pooled<M> {
  fn deref_mut(&mut self) -> &mut M::Connection {
    match &mut self.connection {
      Some(connection) => connection,
      None => unreachable!("pooled connection already taken"),
    }
  }
}

impl<M: Manage> Drop for Pooled<M> {
  fn drop(&mut self) {
    self.dispose_inner();
  }
}
