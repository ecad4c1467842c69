/*!
 * Synchronization and Teardown
 */

use super::{Counters, LifetimeAllocator};
use crate::memory::types::{DrainReport, SyncReport};
use std::sync::atomic::Ordering;
use tracing::{debug, info, instrument, warn};

impl LifetimeAllocator {
    /// Purge ledger entries at or below zero
    ///
    /// Runs under the global lock. Positive entries and region membership are
    /// never touched; blocks queued for batched reclamation stay queued.
    #[instrument(level = "debug", skip(self), fields(allocator = self.id))]
    pub fn synchronize(&self) -> SyncReport {
        let mut registry = self.global.lock();
        let (ledgers, ledgers_pruned) = registry.live();

        let mut report = SyncReport {
            ledgers_scanned: ledgers.len(),
            ledgers_pruned,
            ..SyncReport::default()
        };
        for cell in &ledgers {
            report.entries_purged += cell.lock().purge_stale();
        }
        drop(registry);

        Counters::bump(&self.counters.sync_passes, 1);
        Counters::bump(&self.counters.purged, report.entries_purged as u64);
        debug!(
            scanned = report.ledgers_scanned,
            purged = report.entries_purged,
            pruned = report.ledgers_pruned,
            "Synchronization pass complete"
        );
        report
    }

    /// Close the allocator and force-reclaim every live block
    ///
    /// Later allocations fail with `Closed`; later releases of drained blocks
    /// report `UseAfterReclaim`. Callers should be quiescent while draining.
    #[instrument(level = "info", skip(self), fields(allocator = self.id))]
    pub fn drain(&self) -> DrainReport {
        self.closed.store(true, Ordering::SeqCst);
        let mut registry = self.global.lock();
        let mut report = DrainReport::default();

        for region in self.regions.iter() {
            for block in region.take_all() {
                self.provider.release(block.address(), block.size());
                report.reclaimed_bytes += block.size();
                report.reclaimed.push(block);
            }
        }

        // Orphaned blocks were still in their regions and went with them
        self.orphans.lock().clear();

        let (ledgers, _) = registry.live();
        for cell in &ledgers {
            let (entries, retired) = cell.lock().clear();
            if entries + retired > 0 {
                report.ledgers_cleared += 1;
            }
        }
        drop(registry);

        Counters::bump(&self.counters.reclaimed, report.reclaimed.len() as u64);
        if report.is_clean() {
            info!("Allocator drained with no live blocks");
        } else {
            warn!(
                blocks = report.reclaimed.len(),
                bytes = report.reclaimed_bytes,
                ledgers = report.ledgers_cleared,
                "Drain force-reclaimed live blocks"
            );
        }
        report
    }
}
