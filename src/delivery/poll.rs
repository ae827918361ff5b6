//! Interval polling.

use super::{DeliveryStrategy, Dispatcher, StrategyKind};
use crate::error::Result;
use crate::transport::Transport;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Run one fetch cycle: fetch everything after the current watermark and
/// dispatch it in `(timestamp, id)` order. Returns how many messages were
/// delivered.
///
/// A failed fetch leaves the watermark where it was.
pub(crate) fn poll_once(transport: &dyn Transport, dispatcher: &Dispatcher) -> Result<usize> {
    let watermark = dispatcher.watermark();
    let mut fetched = transport.fetch_since(dispatcher.topic(), &watermark)?;
    fetched.retain(|message| watermark.is_advanced_by(message));
    Ok(dispatcher.dispatch_batch(fetched))
}

/// Fetches new messages on a fixed interval from a dedicated thread.
///
/// Cycles run back to back with a stop-aware wait in between, so at most
/// one fetch per topic is ever outstanding. The first cycle runs as soon as
/// the strategy starts.
pub struct PollStrategy {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PollStrategy {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            interval,
            stop: None,
            thread: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl DeliveryStrategy for PollStrategy {
    fn start(&mut self) -> Result<()> {
        if self.stop.is_some() {
            return Ok(());
        }

        let (stop, stop_rx) = bounded::<()>(1);
        let transport = Arc::clone(&self.transport);
        let dispatcher = Arc::clone(&self.dispatcher);
        let interval = self.interval;

        // stop() may run on this very thread from a subscriber callback, so
        // it only signals; join() waits.
        let handle = thread::Builder::new()
            .name(format!("courier-poll-{}", dispatcher.topic()))
            .spawn(move || loop {
                match poll_once(transport.as_ref(), &dispatcher) {
                    Ok(0) => trace!(topic = %dispatcher.topic(), "poll cycle found nothing new"),
                    Ok(delivered) => {
                        debug!(topic = %dispatcher.topic(), delivered, "poll cycle delivered messages")
                    }
                    Err(e) => {
                        warn!(topic = %dispatcher.topic(), error = %e, "poll cycle failed; retrying next interval")
                    }
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        debug!(topic = %self.dispatcher.topic(), interval_ms = interval.as_millis() as u64, "started polling");
        self.stop = Some(stop);
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
            debug!(topic = %self.dispatcher.topic(), "stopped polling");
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(topic = %self.dispatcher.topic(), "poll thread panicked");
            }
        }
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Poll
    }
}

impl Drop for PollStrategy {
    fn drop(&mut self) {
        self.stop();
    }
}
