// Licensed under the Apache-2.0 license

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};

/// Runs a closure on a fixed period in its own thread until stopped or
/// dropped.
pub struct Ticker {
    name: String,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
}

impl Ticker {
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = name.to_string();
        let handle = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    _ => break,
                }
            }
            debug!("{} ticker stopped", thread_name);
        });
        Ticker {
            name: name.to_string(),
            handle: Some(handle),
            stop_tx: Some(stop_tx),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            // Dropped from inside its own tick; the loop exits on its own.
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("{} ticker panicked", self.name);
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
