mod common;
use common::*;

use braid::error::{Canceled, RecvError, SendError};
use braid::{coroutine, for_select, select, Channel, Deadline, FallibleChannel};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, PartialEq)]
enum Picked {
  Left(u32),
  Right(u32),
  Closed,
  Timeout,
  Nothing,
}

fn pick(r: Result<u32, RecvError>, wrap: fn(u32) -> Picked) -> Picked {
  match r {
    Ok(v) => wrap(v),
    Err(_) => Picked::Closed,
  }
}

#[test]
fn exactly_one_clause_commits_when_both_ready() {
  for _ in 0..ITEMS_LOW {
    let left = Channel::new(1);
    let right = Channel::new(1);
    left.send(1, Deadline::never()).unwrap();
    right.send(2, Deadline::never()).unwrap();

    let got = select(|s| {
      s.receive(&left, |r| pick(r, Picked::Left));
      s.receive(&right, |r| pick(r, Picked::Right));
    })
    .unwrap();

    match &got {
      Picked::Left(1) => assert_eq!(right.len(), 1),
      Picked::Right(2) => assert_eq!(left.len(), 1),
      other => panic!("unexpected pick {other:?}"),
    }
    assert_eq!(left.len() + right.len(), 1);

    let second = select(|s| {
      s.receive(&left, |r| pick(r, Picked::Left));
      s.receive(&right, |r| pick(r, Picked::Right));
    })
    .unwrap();
    match (got, second) {
      (Picked::Left(1), Picked::Right(2)) | (Picked::Right(2), Picked::Left(1)) => {}
      pair => panic!("unexpected second pick {pair:?}"),
    }
  }
}

#[test]
fn past_timeout_fires_before_otherwise() {
  let idle: Channel<u32> = Channel::rendezvous();
  let got = select(|s| {
    s.receive(&idle, |r| pick(r, Picked::Left));
    s.timeout(Deadline::immediately(), || Picked::Timeout);
    s.otherwise(|| Picked::Nothing);
  });
  assert_eq!(got, Ok(Picked::Timeout));
}

#[test]
fn otherwise_never_blocks() {
  let idle: Channel<u32> = Channel::rendezvous();
  let got = select(|s| {
    s.receive(&idle, |r| pick(r, Picked::Left));
    s.timeout(Deadline::after(LONG_TIMEOUT), || Picked::Timeout);
    s.otherwise(|| Picked::Nothing);
  });
  assert_eq!(got, Ok(Picked::Nothing));
}

#[test]
fn blocked_select_times_out() {
  let idle: Channel<u32> = Channel::rendezvous();
  let got = select(|s| {
    s.receive(&idle, |r| pick(r, Picked::Left));
    s.timeout(Deadline::after(SHORT_TIMEOUT), || Picked::Timeout);
  });
  assert_eq!(got, Ok(Picked::Timeout));
  // The timed-out clause must not have consumed a later send.
  idle.close().unwrap();
  assert_eq!(idle.receive(Deadline::immediately()), Err(RecvError::Closed));
}

#[test]
fn competing_selects_each_value_once() {
  let left: Channel<usize> = Channel::rendezvous();
  let right: Channel<usize> = Channel::rendezvous();
  let delivered = Arc::new(AtomicUsize::new(0));

  let mut consumers = Vec::new();
  for _ in 0..4 {
    let (lc, rc) = (left.clone(), right.clone());
    let delivered = delivered.clone();
    consumers.push(coroutine::spawn(move || {
      for_select(
        |s| {
          s.receive(&lc, |r| r);
          s.receive(&rc, |r| r);
        },
        |r| match r {
          Ok(_) => {
            delivered.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
          }
          // Every send completed before the close, so nothing is left.
          Err(_) => ControlFlow::Break(()),
        },
      )
    }));
  }

  for i in 0..ITEMS_MEDIUM {
    let chan = if i % 2 == 0 { &left } else { &right };
    chan.send(i, Deadline::after(LONG_TIMEOUT)).unwrap();
  }
  left.close().unwrap();
  right.close().unwrap();

  for c in consumers {
    assert_eq!(c.join().unwrap(), Ok(()));
  }
  assert_eq!(delivered.load(Ordering::SeqCst), ITEMS_MEDIUM);
}

#[test]
fn select_send_and_receive_pair_up_across_threads() {
  let ping: Channel<u32> = Channel::rendezvous();
  let pong: Channel<u32> = Channel::rendezvous();

  let (ping_rx, pong_tx) = (ping.clone(), pong.clone());
  let echo = coroutine::spawn(move || {
    for _ in 0..ITEMS_LOW {
      let v = ping_rx.receive(Deadline::after(LONG_TIMEOUT)).unwrap();
      pong_tx.send(v + 1, Deadline::after(LONG_TIMEOUT)).unwrap();
    }
  });

  for i in 0..ITEMS_LOW as u32 {
    let sent = select(|s| {
      s.send(&ping, i, |r| r.is_ok());
      s.timeout(Deadline::after(LONG_TIMEOUT), || false);
    })
    .unwrap();
    assert!(sent);
    let back = select(|s| {
      s.receive(&pong, |r| r.ok());
      s.timeout(Deadline::after(LONG_TIMEOUT), || None);
    })
    .unwrap();
    assert_eq!(back, Some(i + 1));
  }
  echo.join().unwrap();
}

#[test]
fn errors_cross_coroutines_through_select() {
  let results: FallibleChannel<u32, String> = FallibleChannel::new(1);
  let tx = results.clone();
  let worker = coroutine::spawn(move || {
    select(|s| {
      s.send_error(&tx, "parse failed".to_string(), |r| r.is_ok());
    })
  });
  assert_eq!(worker.join().unwrap(), Ok(true));

  let got = select(|s| {
    s.receive_fallible(&results, |r| r);
  });
  assert_eq!(got, Ok(Ok(Err("parse failed".to_string()))));
}

#[test]
fn canceled_select_returns_canceled() {
  let idle: Channel<u32> = Channel::rendezvous();
  let rx = idle.clone();
  let co = coroutine::spawn(move || {
    select(|s| {
      s.receive(&rx, |r| pick(r, Picked::Left));
      s.timeout(Deadline::after(STRESS_TIMEOUT), || Picked::Timeout);
    })
  });
  thread::sleep(SHORT_TIMEOUT);
  co.cancel();
  assert_eq!(co.join().unwrap(), Err(Canceled));

  // Nothing is left registered on the channel.
  assert!(idle.send(1, Deadline::immediately()).is_err());
}

#[test]
fn send_clause_on_closed_channel_returns_the_value() {
  let chan: Channel<String> = Channel::new(1);
  chan.close().unwrap();

  let got = select(|s| {
    s.send(&chan, "kept".to_string(), |r| r);
    s.timeout(Deadline::after(LONG_TIMEOUT), || Ok(()));
  });
  assert_eq!(got, Ok(Err(SendError::Closed("kept".to_string()))));
}

#[test]
fn parked_send_clause_sees_close() {
  let chan: Channel<String> = Channel::rendezvous();
  let closer = chan.clone();
  let handle = thread::spawn(move || {
    thread::sleep(SHORT_TIMEOUT);
    closer.close().unwrap();
  });

  let got = select(|s| {
    s.send(&chan, "pending".to_string(), |r| r);
    s.timeout(Deadline::after(STRESS_TIMEOUT), || Ok(()));
  });
  handle.join().unwrap();
  assert_eq!(got, Ok(Err(SendError::Closed("pending".to_string()))));
  assert!(chan.is_drained());
}
