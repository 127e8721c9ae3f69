// Licensed under the Apache-2.0 license

//! Table of requests waiting for a response.
//!
//! Both the MCTP control requester and the PLDM requester park the caller on
//! a channel keyed by whatever identifies the response. The rx path completes
//! the entry; a monitor tick expires it.

use std::fmt::Debug;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bic_sensor::lock;
use log::debug;

/// `None` tells the waiter its request expired.
pub type Reply = Option<Vec<u8>>;

struct Pending<K> {
    key: K,
    deadline: Instant,
    tx: Sender<Reply>,
}

pub struct PendingRequests<K> {
    entries: Mutex<Vec<Pending<K>>>,
}

impl<K> Default for PendingRequests<K> {
    fn default() -> Self {
        PendingRequests {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<K: PartialEq + Clone + Debug> PendingRequests<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: K, timeout: Duration) -> Receiver<Reply> {
        let (tx, rx) = mpsc::channel();
        lock(&self.entries).push(Pending {
            key,
            deadline: Instant::now() + timeout,
            tx,
        });
        rx
    }

    /// Hands `data` to the waiter registered under `key`. Returns false when
    /// nobody is waiting for it.
    pub fn complete(&self, key: &K, data: Vec<u8>) -> bool {
        let entry = {
            let mut entries = lock(&self.entries);
            let Some(pos) = entries.iter().position(|p| &p.key == key) else {
                return false;
            };
            entries.remove(pos)
        };
        if entry.tx.send(Some(data)).is_err() {
            debug!("Waiter for {:?} already gone", key);
        }
        true
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|p| &p.key != key);
        entries.len() != before
    }

    /// Drops every entry past its deadline, waking its waiter with `None`.
    /// Returns the expired keys.
    pub fn expire(&self, now: Instant) -> Vec<K> {
        let expired: Vec<Pending<K>> = {
            let mut entries = lock(&self.entries);
            let (gone, keep): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|p| p.deadline <= now);
            *entries = keep;
            gone
        };
        expired
            .into_iter()
            .map(|p| {
                let _ = p.tx.send(None);
                p.key
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_complete_and_expire() {
        let pending = PendingRequests::<(u8, u8)>::new();
        let first = pending.register((1, 0x11), Duration::from_secs(60));
        let second = pending.register((2, 0x11), Duration::ZERO);
        assert_eq!(pending.len(), 2);

        assert!(!pending.complete(&(3, 0x11), vec![0]));
        assert!(pending.complete(&(1, 0x11), vec![0, 1, 2]));
        assert_eq!(first.recv().unwrap(), Some(vec![0, 1, 2]));

        assert_eq!(pending.expire(Instant::now()), vec![(2, 0x11)]);
        assert_eq!(second.recv().unwrap(), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_remove() {
        let pending = PendingRequests::<u8>::new();
        let _rx = pending.register(4, Duration::from_secs(1));
        assert!(pending.remove(&4));
        assert!(!pending.remove(&4));
        assert!(!pending.complete(&4, vec![]));
    }
}
