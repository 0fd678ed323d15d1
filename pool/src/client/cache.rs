use crate::client::Client;
use crate::error::PoolError;
use crate::pool::Manage;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Key = (String, u16);

/// Clients keyed by `(host, port)`, owned by whoever creates the cache.
///
/// `factory` builds the client for a host the first time it is asked for.
/// Dropping the cache drops its handles; [`clear`](Self::clear) also closes
/// every cached client's pool.
pub struct ClientCache<M: Manage, F> {
  clients: Mutex<HashMap<Key, Arc<Client<M>>>>,
  factory: F,
}

impl<M: Manage, F> fmt::Debug for ClientCache<M, F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ClientCache")
      .field("hosts", &self.clients.lock().keys().collect::<Vec<_>>())
      .finish()
  }
}

impl<M, F> ClientCache<M, F>
where
  M: Manage,
  F: Fn(&str, u16) -> Result<Client<M>, PoolError>,
{
  pub fn new(factory: F) -> Self {
    ClientCache {
      clients: Mutex::new(HashMap::new()),
      factory,
    }
  }

  /// Returns the client for `host:port`, creating it on first use.
  ///
  /// The factory runs without the cache lock held. If two callers race to
  /// create the same client, the first one stored wins and the other is
  /// closed.
  pub fn get_or_create(&self, host: &str, port: u16) -> Result<Arc<Client<M>>, PoolError> {
    let key = (host.to_owned(), port);
    if let Some(client) = self.clients.lock().get(&key) {
      return Ok(Arc::clone(client));
    }

    let created = Arc::new((self.factory)(host, port)?);
    let mut clients = self.clients.lock();
    let stored = clients.entry(key).or_insert_with(|| Arc::clone(&created));
    if !Arc::ptr_eq(stored, &created) {
      created.close();
    } else {
      tracing::debug!(host, port, "cached new client");
    }
    Ok(Arc::clone(stored))
  }

  /// Removes and returns the client for `host:port`. Its pool stays open.
  pub fn remove(&self, host: &str, port: u16) -> Option<Arc<Client<M>>> {
    self.clients.lock().remove(&(host.to_owned(), port))
  }

  pub fn len(&self) -> usize {
    self.clients.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.clients.lock().is_empty()
  }

  /// Empties the cache and closes every client's pool.
  pub fn clear(&self) {
    let clients = std::mem::take(&mut *self.clients.lock());
    for client in clients.into_values() {
      client.close();
    }
  }
}
