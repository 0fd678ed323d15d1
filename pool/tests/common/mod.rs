#![allow(dead_code)]

use braid_pool::BoxError;
use braid::Deadline;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(3);
pub const ITEMS_LOW: usize = 50;
pub const ITEMS_MEDIUM: usize = 200;

/// A connection that only carries the serial number it was created with.
#[derive(Debug, PartialEq, Eq)]
pub struct Tagged(pub usize);

/// A factory handing out [`Tagged`] connections and counting calls.
pub fn tagged_factory() -> (
  impl Fn(Deadline) -> Result<Tagged, BoxError> + Send + Sync + 'static,
  Arc<AtomicUsize>,
) {
  let created = Arc::new(AtomicUsize::new(0));
  let counter = created.clone();
  let factory = move |_: Deadline| -> Result<Tagged, BoxError> {
    Ok(Tagged(counter.fetch_add(1, Ordering::SeqCst)))
  };
  (factory, created)
}
