//! A request client that runs exchanges over pooled connections and retries
//! on I/O failure.
//!
//! The wire protocol lives outside this crate. A connection is a duplex
//! [`Stream`] plus a request [`Serialize`]r and a response [`Parse`]r; the
//! client only needs the combined [`Exchange`] operation.

mod cache;

pub use cache::ClientCache;

use crate::config::ClientConfig;
use crate::error::{BoxError, ClientError, PoolError};
use crate::pool::{manager_fn, Manage, Pool};

use braid::Deadline;
use std::io;

/// A duplex byte stream, such as a TCP or TLS socket.
pub trait Stream: Send {
  fn open(&mut self, deadline: Deadline) -> io::Result<()>;
  fn read(&mut self, buf: &mut [u8], deadline: Deadline) -> io::Result<usize>;
  fn write(&mut self, bytes: &[u8], deadline: Deadline) -> io::Result<()>;
  fn close(&mut self, deadline: Deadline) -> io::Result<()>;
}

/// Writes requests of type `Req` onto a stream.
pub trait Serialize<S, Req: ?Sized> {
  fn serialize(&mut self, stream: &mut S, request: &Req, deadline: Deadline) -> io::Result<()>;
}

/// Reads one response from a stream.
pub trait Parse<S> {
  type Response;

  fn parse(&mut self, stream: &mut S, deadline: Deadline) -> io::Result<Self::Response>;
}

/// One request/response round trip.
pub trait Exchange<Req: ?Sized> {
  type Response;

  fn exchange(&mut self, request: &Req, deadline: Deadline) -> io::Result<Self::Response>;
}

/// A live link: the stream and the protocol state that reads and writes it.
#[derive(Debug)]
pub struct Connection<S, W, P> {
  pub stream: S,
  pub serializer: W,
  pub parser: P,
}

impl<S: Stream, W, P> Connection<S, W, P> {
  /// Opens `stream` and bundles it with its protocol state.
  pub fn open(mut stream: S, serializer: W, parser: P, deadline: Deadline) -> io::Result<Self> {
    stream.open(deadline)?;
    Ok(Connection {
      stream,
      serializer,
      parser,
    })
  }

  pub fn close(&mut self, deadline: Deadline) -> io::Result<()> {
    self.stream.close(deadline)
  }
}

/// Builds a [`Manage`] for [`Connection`]s made by `open`.
///
/// Discarded connections are closed through [`Connection::close`] with the
/// pool's close deadline. A failed close is logged and otherwise ignored.
pub fn connection_manager<F, S, W, P>(open: F) -> impl Manage<Connection = Connection<S, W, P>>
where
  F: Fn(Deadline) -> Result<Connection<S, W, P>, BoxError> + Send + Sync + 'static,
  S: Stream + 'static,
  W: Send + 'static,
  P: Send + 'static,
{
  manager_fn(open).on_close(|mut connection: Connection<S, W, P>, deadline| {
    if let Err(e) = connection.close(deadline) {
      tracing::warn!(error = %e, "failed to close connection");
    }
  })
}

impl<S, W, P, Req> Exchange<Req> for Connection<S, W, P>
where
  S: Stream,
  W: Serialize<S, Req>,
  P: Parse<S>,
  Req: ?Sized,
{
  type Response = P::Response;

  fn exchange(&mut self, request: &Req, deadline: Deadline) -> io::Result<P::Response> {
    self.serializer.serialize(&mut self.stream, request, deadline)?;
    self.parser.parse(&mut self.stream, deadline)
  }
}

/// Sends requests over a [`Pool`] of connections.
///
/// A connection that fails I/O is disposed, never returned to the pool, and
/// the whole request is retried on a fresh connection up to
/// [`ClientConfig::retries`] attempts in total.
pub struct Client<M: Manage> {
  pool: Pool<M>,
  config: ClientConfig,
}

impl<M: Manage> std::fmt::Debug for Client<M> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Client")
      .field("pool", &self.pool)
      .field("retries", &self.config.retries)
      .finish()
  }
}

impl<M: Manage> Client<M> {
  /// Creates a client with a new pool built from `config.pool`.
  pub fn new(manager: M, config: ClientConfig) -> Result<Self, PoolError> {
    let pool = Pool::new(manager, config.pool.clone())?;
    Ok(Client { pool, config })
  }

  /// Creates a client sharing an existing pool. `config.pool` is ignored.
  pub fn with_pool(pool: Pool<M>, config: ClientConfig) -> Self {
    Client { pool, config }
  }

  pub fn pool(&self) -> &Pool<M> {
    &self.pool
  }

  pub fn config(&self) -> &ClientConfig {
    &self.config
  }

  /// Sends `request` and returns the parsed response.
  ///
  /// `deadline` bounds the whole call, including waits for a connection.
  /// Each exchange is further bounded by the configured request timeout.
  ///
  /// # Errors
  ///
  /// - [`ClientError::Pool`] as soon as borrowing fails; pool errors are not
  ///   retried.
  /// - [`ClientError::Io`] carrying the last attempt's error once every
  ///   attempt has failed.
  pub fn send<Req>(
    &self,
    request: &Req,
    deadline: Deadline,
  ) -> Result<<M::Connection as Exchange<Req>>::Response, ClientError>
  where
    Req: ?Sized,
    M::Connection: Exchange<Req>,
  {
    let attempts = self.config.retries.max(1);
    let mut attempt = 0;
    loop {
      attempt += 1;
      let mut connection = self.pool.borrow(deadline)?;
      let exchange_deadline = deadline.min(Deadline::after(self.config.request_timeout));

      match connection.exchange(request, exchange_deadline) {
        Ok(response) => {
          connection.release();
          return Ok(response);
        }
        Err(e) => {
          connection.dispose();
          if attempt >= attempts {
            tracing::warn!(attempts, error = %e, "request failed, giving up");
            return Err(ClientError::Io {
              attempts: attempt,
              source: e,
            });
          }
          tracing::debug!(attempt, error = %e, "request failed, retrying on a fresh connection");
        }
      }
    }
  }

  /// Closes the underlying pool.
  pub fn close(&self) {
    self.pool.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::PoolConfig;
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  /// An in-memory stream: writes are recorded, reads replay `incoming`.
  #[derive(Debug, Default)]
  struct MemoryStream {
    opened: bool,
    written: Vec<u8>,
    incoming: VecDeque<u8>,
  }

  impl Stream for MemoryStream {
    fn open(&mut self, _: Deadline) -> io::Result<()> {
      self.opened = true;
      Ok(())
    }
    fn read(&mut self, buf: &mut [u8], _: Deadline) -> io::Result<usize> {
      let n = buf.len().min(self.incoming.len());
      for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
        *slot = byte;
      }
      Ok(n)
    }
    fn write(&mut self, bytes: &[u8], _: Deadline) -> io::Result<()> {
      self.written.extend_from_slice(bytes);
      // Echo server.
      self.incoming.extend(bytes.iter().copied());
      self.incoming.push_back(b'\n');
      Ok(())
    }
    fn close(&mut self, _: Deadline) -> io::Result<()> {
      self.opened = false;
      Ok(())
    }
  }

  struct LineWriter;
  impl Serialize<MemoryStream, str> for LineWriter {
    fn serialize(&mut self, stream: &mut MemoryStream, request: &str, deadline: Deadline) -> io::Result<()> {
      stream.write(request.as_bytes(), deadline)
    }
  }

  struct LineReader;
  impl Parse<MemoryStream> for LineReader {
    type Response = String;
    fn parse(&mut self, stream: &mut MemoryStream, deadline: Deadline) -> io::Result<String> {
      let mut line = Vec::new();
      let mut byte = [0u8; 1];
      loop {
        if stream.read(&mut byte, deadline)? == 0 {
          return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no newline"));
        }
        if byte[0] == b'\n' {
          break;
        }
        line.push(byte[0]);
      }
      String::from_utf8(line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
  }

  type EchoConnection = Connection<MemoryStream, LineWriter, LineReader>;

  #[test]
  fn exchange_round_trips_through_connection() {
    let mut conn = EchoConnection::open(
      MemoryStream::default(),
      LineWriter,
      LineReader,
      Deadline::never(),
    )
    .unwrap();
    assert!(conn.stream.opened);
    assert_eq!(conn.exchange("ping", Deadline::never()).unwrap(), "ping");
    assert_eq!(conn.stream.written, b"ping");
    conn.close(Deadline::never()).unwrap();
    assert!(!conn.stream.opened);
  }

  #[test]
  fn client_reuses_healthy_connection() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let manager = manager_fn(move |deadline| -> Result<EchoConnection, BoxError> {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(EchoConnection::open(
        MemoryStream::default(),
        LineWriter,
        LineReader,
        deadline,
      )?)
    });
    let config = ClientConfig::new().pool(PoolConfig::new(0..=2).unwrap());
    let client = Client::new(manager, config).unwrap();

    for word in ["a", "bb", "ccc"] {
      assert_eq!(client.send(word, Deadline::never()).unwrap(), word);
    }
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(client.pool().status().available, 1);
  }
}
