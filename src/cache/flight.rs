//! Single-flight coalescing: at most one in-flight computation per key.
//!
//! The first caller for a key becomes the leader and runs the work; concurrent callers
//! for the same key park on a oneshot and receive a clone of the leader's outcome. If the
//! leader is dropped before completing, parked callers retry and one of them leads.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::debug;

pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Vec<oneshot::Sender<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

/// Role assigned by [`SingleFlight::join`]
pub enum Flight<'a, T: Clone> {
    Leader(FlightGuard<'a, T>),
    Follower(oneshot::Receiver<T>),
}

/// Held by the leader; completing it wakes every follower
pub struct FlightGuard<'a, T: Clone> {
    owner: &'a SingleFlight<T>,
    key: String,
    done: bool,
}

impl<T: Clone> FlightGuard<'_, T> {
    pub fn complete(mut self, value: &T) {
        let waiters = self.owner.inflight.lock().remove(&self.key).unwrap_or_default();
        if !waiters.is_empty() {
            debug!(key = %self.key, followers = waiters.len(), "Sharing result with followers");
        }
        for tx in waiters {
            let _ = tx.send(value.clone());
        }
        self.done = true;
    }
}

impl<T: Clone> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            // Dropping the senders wakes followers with a closed channel.
            self.owner.inflight.lock().remove(&self.key);
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, key: &str) -> Flight<'_, T> {
        let mut inflight = self.inflight.lock();
        if let Some(waiters) = inflight.get_mut(key) {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            return Flight::Follower(rx);
        }
        inflight.insert(key.to_string(), Vec::new());
        Flight::Leader(FlightGuard {
            owner: self,
            key: key.to_string(),
            done: false,
        })
    }

    /// Run `work` unless an identical key is already in flight, in which case wait for it
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut work = Some(work);
        loop {
            match self.join(key) {
                Flight::Leader(guard) => {
                    let work = match work.take() {
                        Some(work) => work,
                        None => unreachable!("leader work is consumed at most once"),
                    };
                    let value = work().await;
                    guard.complete(&value);
                    return value;
                }
                Flight::Follower(rx) => match rx.await {
                    Ok(value) => return value,
                    Err(_) => {
                        debug!(key, "Leader abandoned flight; retrying");
                        continue;
                    }
                },
            }
        }
    }

    /// Keys currently being computed
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}
