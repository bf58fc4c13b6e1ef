//! Single-flight coalescing of rebuilds keyed by entity.
//!
//! The first caller for a key runs the work; callers arriving while it is in
//! flight subscribe to a watch channel and receive a clone of the same
//! outcome. If the leader is dropped mid-flight its entry is cleared and a
//! waiting caller takes over.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;

pub(crate) struct Flights<T> {
    inflight: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

/// Clears the leader's entry when its flight ends or is cancelled.
struct FlightGuard<'a, T> {
    flights: &'a Flights<T>,
    key: &'a str,
}

impl<T> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        self.flights.lock().remove(self.key);
    }
}

impl<T> Flights<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Receiver<Option<T>>>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone> Flights<T> {
    pub(crate) fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` unless a flight for `key` is already underway, in which case
    /// wait for that one and return its outcome.
    pub(crate) async fn run<F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let tx = loop {
            let existing = {
                let mut inflight = self.lock();
                match inflight.get(key) {
                    Some(rx) => rx.clone(),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(key.to_string(), rx);
                        break tx;
                    }
                }
            };
            if let Some(value) = follow(existing).await {
                return value;
            }
        };

        let guard = FlightGuard { flights: self, key };
        let value = f().await;
        let _ = tx.send(Some(value.clone()));
        drop(guard);
        value
    }

    /// Block until any in-flight work for `key` completes.
    pub(crate) async fn wait(&self, key: &str) {
        let existing = self.lock().get(key).cloned();
        if let Some(rx) = existing {
            let _ = follow(rx).await;
        }
    }

    #[cfg(test)]
    pub(crate) fn is_inflight(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }
}

/// Wait for a leader's outcome. `None` means the leader was dropped first.
async fn follow<T: Clone>(mut rx: watch::Receiver<Option<T>>) -> Option<T> {
    loop {
        if let Some(value) = rx.borrow_and_update().clone() {
            return Some(value);
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}
