mod common;
use common::*;

use braid::coroutine::{self, Builder};
use braid::error::{Canceled, JoinError, RecvError, SendError};
use braid::{Channel, Deadline};
use std::thread;
use std::time::Instant;

#[test]
fn builder_names_coroutine() {
  let co = Builder::new()
    .name("worker-1".to_string())
    .spawn(|| coroutine::is_canceled())
    .unwrap();
  assert_eq!(co.name(), Some("worker-1"));
  assert_eq!(co.join(), Ok(false));
}

#[test]
fn builder_sets_stack_size() {
  let co = Builder::new()
    .name("deep".to_string())
    .stack_size(16 * 1024 * 1024)
    .spawn(|| {
      // Larger than the 2 MiB default for spawned threads.
      let scratch = [7u8; 3 * 1024 * 1024];
      scratch.iter().map(|b| *b as usize).sum::<usize>()
    })
    .unwrap();
  assert_eq!(co.join(), Ok(7 * 3 * 1024 * 1024));
}

#[test]
fn panic_is_reported_on_join() {
  let co = coroutine::spawn(|| -> u32 { panic!("boom") });
  assert_eq!(co.join(), Err(JoinError::Panicked));
}

#[test]
fn cancel_interrupts_blocked_send_and_receive() {
  let chan: Channel<u32> = Channel::rendezvous();

  let tx = chan.clone();
  let sender = coroutine::spawn(move || tx.send(1, Deadline::never()));
  let rx = chan.clone();
  let receiver = coroutine::spawn(move || {
    // Give the sender time to pair up with someone else if it could.
    coroutine::sleep(Deadline::after(LONG_TIMEOUT))?;
    Ok::<_, Canceled>(rx.receive(Deadline::never()))
  });

  thread::sleep(SHORT_TIMEOUT);
  sender.cancel();
  receiver.cancel();

  assert_eq!(sender.join().unwrap(), Err(SendError::Canceled(1)));
  assert_eq!(receiver.join().unwrap(), Err(Canceled));
}

#[test]
fn cancel_is_sticky() {
  let co = coroutine::spawn(|| {
    while !coroutine::is_canceled() {
      coroutine::yield_now();
    }
    let chan: Channel<u8> = Channel::new(1);
    chan.receive(Deadline::never())
  });
  co.cancel();
  assert!(co.is_canceled());
  assert_eq!(co.join().unwrap(), Err(RecvError::Canceled));
}

#[test]
fn sleep_waits_for_deadline() {
  let start = Instant::now();
  coroutine::sleep(Deadline::after(SHORT_TIMEOUT)).unwrap();
  assert!(start.elapsed() >= SHORT_TIMEOUT);
}
