//! # Single Flight
//!
//! Collapses concurrent work on the same key into one execution. The first
//! caller for a key becomes the leader and does the work; callers arriving
//! while it runs become followers and receive a clone of the leader's result.
//!
//! The key is released as soon as the leader publishes (or is dropped), so a
//! call made after completion starts a new flight.

use core_async::sync::watch;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

type Inflight<K, V> = Arc<Mutex<HashMap<K, watch::Receiver<Option<V>>>>>;

pub struct SingleFlight<K, V> {
    inflight: Inflight<K, V>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Leader if nobody is working on `key`, follower otherwise.
    pub fn join(&self, key: K) -> Flight<K, V> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(rx) = inflight.get(&key) {
            return Flight::Follower(FlightFollower { rx: rx.clone() });
        }

        let (tx, rx) = watch::channel(None);
        inflight.insert(key.clone(), rx);
        Flight::Leader(FlightLeader {
            inflight: Arc::clone(&self.inflight),
            key,
            tx: Some(tx),
        })
    }

    /// Runs `operation` as leader, or waits for the current leader.
    ///
    /// Returns `None` only when the leader was dropped before publishing.
    pub async fn run<F, Fut>(&self, key: K, operation: F) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        match self.join(key) {
            Flight::Leader(leader) => {
                let value = operation().await;
                leader.publish(value.clone());
                Some(value)
            }
            Flight::Follower(follower) => follower.wait().await,
        }
    }

    /// Keys with a flight in progress.
    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

pub enum Flight<K: Eq + Hash, V> {
    Leader(FlightLeader<K, V>),
    Follower(FlightFollower<V>),
}

/// Owner of a flight. Dropping it without publishing wakes followers with `None`.
pub struct FlightLeader<K: Eq + Hash, V> {
    inflight: Inflight<K, V>,
    key: K,
    tx: Option<watch::Sender<Option<V>>>,
}

impl<K: Eq + Hash, V> FlightLeader<K, V> {
    /// A follower handle for the leader's own flight.
    pub fn subscribe(&self) -> Option<FlightFollower<V>> {
        self.tx.as_ref().map(|tx| FlightFollower {
            rx: tx.subscribe(),
        })
    }

    /// Hands `value` to every follower and releases the key.
    pub fn publish(mut self, value: V) {
        self.release();
        if let Some(tx) = self.tx.take() {
            // No followers left is fine.
            let _ = tx.send(Some(value));
        }
    }

    fn release(&self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<K: Eq + Hash, V> Drop for FlightLeader<K, V> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.release();
        }
    }
}

pub struct FlightFollower<V> {
    rx: watch::Receiver<Option<V>>,
}

impl<V: Clone> FlightFollower<V> {
    /// The leader's value, or `None` if the leader went away without one.
    pub async fn wait(mut self) -> Option<V> {
        let value = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        value
    }
}
