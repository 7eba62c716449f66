//! Connectivity tracking.
//!
//! The platform's connectivity signal is abstracted behind this monitor:
//! whatever integration layer owns the real signal calls `set_online`, and
//! the dispatcher's drain task observes transitions through `subscribe`.
//!
//! Transitions are delivered as edge events over unbounded channels rather
//! than a latest-value cell, so a fast offline→online flip is never
//! coalesced away: every subscriber sees every transition, in order, even
//! ones that happened before it was first polled.

use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

struct State {
  online: bool,
  subscribers: Vec<mpsc::UnboundedSender<bool>>,
}

pub struct ConnectivityMonitor {
  state: Mutex<State>,
}

impl ConnectivityMonitor {
  pub fn new(initially_online: bool) -> Self {
    Self {
      state: Mutex::new(State {
        online: initially_online,
        subscribers: Vec::new(),
      }),
    }
  }

  pub fn is_online(&self) -> bool {
    self.lock().online
  }

  /// Record a connectivity change. No-op if the state is unchanged, so
  /// repeated platform events do not produce spurious transitions.
  pub fn set_online(&self, online: bool) {
    let mut state = self.lock();
    if state.online == online {
      return;
    }
    state.online = online;
    // Dead subscribers are dropped as a side effect of delivery
    state.subscribers.retain(|tx| tx.send(online).is_ok());
  }

  /// Receiver that yields the new state on every transition from this
  /// point on. Events are buffered, never coalesced.
  pub fn subscribe(&self) -> mpsc::UnboundedReceiver<bool> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.lock().subscribers.push(tx);
    rx
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    match self.state.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

impl Default for ConnectivityMonitor {
  fn default() -> Self {
    Self::new(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_transitions_notify_subscribers() {
    let monitor = ConnectivityMonitor::new(true);
    let mut rx = monitor.subscribe();

    monitor.set_online(false);
    assert_eq!(rx.recv().await, Some(false));
    assert!(!monitor.is_online());

    monitor.set_online(true);
    assert_eq!(rx.recv().await, Some(true));
    assert!(monitor.is_online());
  }

  #[tokio::test]
  async fn test_redundant_updates_do_not_notify() {
    let monitor = ConnectivityMonitor::new(true);
    let mut rx = monitor.subscribe();

    monitor.set_online(true);
    assert!(matches!(
      rx.try_recv(),
      Err(mpsc::error::TryRecvError::Empty)
    ));
  }

  #[tokio::test]
  async fn test_back_to_back_flips_are_not_coalesced() {
    let monitor = ConnectivityMonitor::new(true);
    let mut rx = monitor.subscribe();

    // No yield between these: both edges must still be delivered
    monitor.set_online(false);
    monitor.set_online(true);

    assert_eq!(rx.recv().await, Some(false));
    assert_eq!(rx.recv().await, Some(true));
  }

  #[tokio::test]
  async fn test_transitions_before_first_poll_are_buffered() {
    let monitor = ConnectivityMonitor::new(true);
    let mut rx = monitor.subscribe();

    monitor.set_online(false);
    monitor.set_online(true);
    monitor.set_online(false);

    let mut seen = Vec::new();
    while let Ok(online) = rx.try_recv() {
      seen.push(online);
    }
    assert_eq!(seen, vec![false, true, false]);
  }
}
