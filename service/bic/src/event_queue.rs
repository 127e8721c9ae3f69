// Licensed under the Apache-2.0 license

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::{Result, ServiceError};

/// Multi-producer, single-consumer queue feeding a worker thread.
///
/// Only the instance returned by [`EventQueue::new`] can dequeue. Clones
/// share the sender side so any thread can post events to the worker.
pub struct EventQueue<Event: Default + Clone> {
    sender: Sender<Event>,
    receiver: Option<Receiver<Event>>,
}

impl<Event: Default + Clone> Default for EventQueue<Event> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Event: Default + Clone> EventQueue<Event> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            sender: tx,
            receiver: Some(rx),
        }
    }

    /// Posts an event. Fails once the consuming side has gone away.
    pub fn enqueue(&self, event: Event) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| ServiceError::ChannelClosed)
    }

    /// Blocks for the next event. `None` on a sender-only clone or when every
    /// sender has been dropped.
    pub fn dequeue(&self) -> Option<Event> {
        self.receiver.as_ref()?.recv().ok()
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<Event>> {
        let Some(receiver) = &self.receiver else {
            return Err(ServiceError::ChannelClosed);
        };
        match receiver.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ServiceError::ChannelClosed),
        }
    }
}

impl<Event: Default + Clone> Clone for EventQueue<Event> {
    /// The clone can only enqueue.
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: None,
        }
    }
}
