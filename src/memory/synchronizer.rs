/*!
 * Background Synchronizer
 *
 * Runs `synchronize()` on a dedicated thread at a fixed period, off the
 * allocation hot path. Stopping is signalled over a channel so the thread
 * wakes immediately instead of finishing its sleep.
 */

use super::allocator::LifetimeAllocator;
use flume::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Handle to a running synchronizer thread; stops and joins on drop
#[derive(Debug)]
pub struct SyncDaemon {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<u64>>,
}

impl SyncDaemon {
    /// Spawn with the allocator's configured interval
    pub fn start(allocator: Arc<LifetimeAllocator>) -> std::io::Result<Self> {
        let interval = allocator.config().sync_interval();
        Self::spawn(allocator, interval)
    }

    pub fn spawn(allocator: Arc<LifetimeAllocator>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = flume::bounded(1);
        let thread = std::thread::Builder::new()
            .name(format!("lifealloc-sync-{}", allocator.id()))
            .spawn(move || run(allocator, interval, stop_rx))?;

        info!(interval_ms = interval.as_millis() as u64, "Synchronizer started");
        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop the thread and return how many passes it ran
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            // A closed channel also stops the loop
            let _ = stop.send(());
        }
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(passes)) => {
                info!(passes, "Synchronizer stopped");
                passes
            }
            Some(Err(_)) => {
                error!("Synchronizer thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for SyncDaemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(allocator: Arc<LifetimeAllocator>, interval: Duration, stop: Receiver<()>) -> u64 {
    let mut passes = 0;
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if allocator.is_closed() {
                    debug!("Allocator closed, synchronizer exiting");
                    break;
                }
                let report = allocator.synchronize();
                passes += 1;
                if report.entries_purged > 0 {
                    debug!(purged = report.entries_purged, "Periodic synchronization purged entries");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    passes
}
