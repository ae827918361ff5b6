//! Background expiry sweep.

use super::engine::CacheEngine;
use crate::error::Result;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Handle to a running sweeper thread. Dropping it stops the thread.
pub struct SweeperHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub(crate) fn spawn(engine: Weak<CacheEngine>, interval: Duration) -> Result<Self> {
        let (stop, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("courier-cache-sweeper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                match engine.upgrade() {
                    Some(engine) => {
                        engine.sweep_expired();
                    }
                    None => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Stop the sweeper and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("cache sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
