//! Cancellable delayed actions keyed by widget

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::PageId;

/// A task that runs once after a delay unless cancelled or restarted first
pub struct DelayedAction {
    delay: Duration,
    started: Option<Instant>,
    handle: Option<JoinHandle<()>>,
}

impl DelayedAction {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: None,
            handle: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action`; a pending run is cancelled first
    pub fn start<F>(&mut self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.started = Some(Instant::now());
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Still waiting for the delay to pass
    pub fn is_sleeping(&self) -> bool {
        self.is_running() && !self.remaining().is_zero()
    }

    pub fn remaining(&self) -> Duration {
        match self.started {
            Some(started) if self.handle.is_some() => self.delay.saturating_sub(started.elapsed()),
            _ => Duration::ZERO,
        }
    }
}

impl Drop for DelayedAction {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// What a timer belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Press-armed key
    Button { page: PageId, index: usize },
    /// Dial turn waiting for the ticks to settle
    Dial { page: PageId, index: usize },
    Inactivity,
}

/// Delivered on the session channel when a timer runs out
#[derive(Debug, Clone, PartialEq)]
pub struct Expired {
    pub key: TimerKey,
    pub generation: u64,
}

/// All running timers; expiry is reported as a message instead of running a callback
pub struct TimerRegistry<E> {
    timers: HashMap<TimerKey, (u64, DelayedAction)>,
    generation: u64,
    notify: mpsc::UnboundedSender<E>,
}

impl<E: From<Expired> + Send + 'static> TimerRegistry<E> {
    pub fn new(notify: mpsc::UnboundedSender<E>) -> Self {
        Self {
            timers: HashMap::new(),
            generation: 0,
            notify,
        }
    }

    /// Start or restart the timer for `key`
    pub fn start(&mut self, key: TimerKey, delay: Duration) {
        self.generation += 1;
        let generation = self.generation;
        let expired = Expired {
            key: key.clone(),
            generation,
        };
        let tx = self.notify.clone();

        let mut action = DelayedAction::new(delay);
        action.start(async move {
            // The receiver is gone only during shutdown
            let _ = tx.send(E::from(expired));
        });
        debug!("Timer {:?} started for {:?}", key, delay);
        self.timers.insert(key, (generation, action));
    }

    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        match self.timers.remove(key) {
            Some(_) => {
                debug!("Timer {:?} cancelled", key);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, key: &TimerKey) -> bool {
        self.timers.get(key).is_some_and(|(_, t)| t.is_running())
    }

    pub fn is_sleeping(&self, key: &TimerKey) -> bool {
        self.timers.get(key).is_some_and(|(_, t)| t.is_sleeping())
    }

    /// Remaining time and full delay of a sleeping timer
    pub fn progress(&self, key: &TimerKey) -> Option<(Duration, Duration)> {
        self.timers
            .get(key)
            .filter(|(_, t)| t.is_sleeping())
            .map(|(_, t)| (t.remaining(), t.delay()))
    }

    /// Claim an expiry; false when the timer was restarted or cancelled since
    pub fn take_expired(&mut self, expired: &Expired) -> bool {
        match self.timers.get(&expired.key) {
            Some((generation, _)) if *generation == expired.generation => {
                self.timers.remove(&expired.key);
                true
            }
            _ => false,
        }
    }

    pub fn sleeping(&self) -> Vec<TimerKey> {
        self.timers
            .iter()
            .filter(|(_, (_, t))| t.is_sleeping())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Cancel everything except the inactivity timer
    pub fn clear_widgets(&mut self) {
        self.timers.retain(|k, _| *k == TimerKey::Inactivity);
    }
}
