//! A bounded connection pool and a retrying request client built on
//! [`braid`] channels.
//!
//! A [`Pool`] hands out connections produced by a [`Manage`] factory, keeps
//! at most `max_size` of them alive, and parks borrowers on a channel while it
//! is exhausted. A [`Client`] sends requests over pooled connections,
//! disposing and retrying on I/O failure. [`ClientCache`] keeps one client per
//! `(host, port)` for callers that talk to several endpoints.
//!
//! ```
//! use braid::Deadline;
//! use braid_pool::{manager_fn, Pool, PoolConfig};
//!
//! let pool = Pool::new(manager_fn(|_| Ok(String::from("conn"))), PoolConfig::new(1..=4)?)?;
//! let conn = pool.borrow(Deadline::never())?;
//! assert_eq!(conn.as_str(), "conn");
//! conn.release();
//! assert_eq!(pool.status().available, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod pool;

pub use client::{
  connection_manager, Client, ClientCache, Connection, Exchange, Parse, Serialize, Stream,
};
pub use config::{ClientConfig, PoolConfig};
pub use error::{BoxError, BuildError, ClientError, PoolError};
pub use pool::{manager_fn, FnManager, Manage, Pool, PoolStatus, Pooled};
