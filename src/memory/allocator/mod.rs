/*!
 * Lifetime Allocator
 *
 * Classification-and-lifecycle layer over a raw provider.
 *
 * ## Request flow
 *
 * - **Allocate**: classify the call context, acquire from the provider,
 *   register the block in its class's region (region lock only), record a
 *   pending count of 1 in the caller's ledger.
 * - **Release**: decrement the caller's ledger entry. Only when it reaches
 *   zero is the block removed from its region and handed back to the provider,
 *   under the global lock.
 * - **Synchronize**: out-of-band pass that purges stale ledger entries.
 *
 * With batched reclamation, blocks a dropped ledger had queued land in an
 * orphan queue; every later hold of the global lock for reclamation or ledger
 * registration empties it.
 *
 * ## Locking
 *
 * - Region lock: one per class, held for a single map operation
 * - Ledger lock: one per ledger, uncontended outside synchronization
 * - Global lock: reclamation, ledger registration, synchronize, drain
 *
 * Order is always global → region and global → ledger. A ledger lock is never
 * held while waiting for the global lock.
 */

mod allocate;
mod handoff;
mod release;
mod sync;

pub use handoff::Transfer;

use super::classifier::{HashClassifier, LifetimeClassifier};
use super::config::{AllocatorConfig, ConfigError};
use super::ledger::{Ledger, LedgerRegistry, OrphanQueue};
use super::provider::{RawProvider, SystemProvider};
use super::region::{Region, RegionTable};
use super::types::{AllocatorStats, BlockHandle, LifetimeClass, MemoryError, MemoryResult};
use crate::core::types::AllocatorId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(1);

/// Operation counters
#[derive(Debug, Default)]
pub(super) struct Counters {
    allocations: AtomicU64,
    failed_allocations: AtomicU64,
    releases: AtomicU64,
    deferred_releases: AtomicU64,
    reclaimed: AtomicU64,
    rejected: AtomicU64,
    sync_passes: AtomicU64,
    purged: AtomicU64,
}

impl Counters {
    #[inline]
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Lifetime-class-aware allocation context
///
/// Owns the region table and the ledger registry. Share it across threads
/// behind an `Arc`; hand every caller its own [`Ledger`].
pub struct LifetimeAllocator {
    id: AllocatorId,
    classifier: Arc<dyn LifetimeClassifier>,
    provider: Arc<dyn RawProvider>,
    regions: RegionTable,
    // The global lock guards the ledger registry
    global: Mutex<LedgerRegistry>,
    orphans: OrphanQueue,
    config: AllocatorConfig,
    next_block: AtomicU64,
    next_ledger: AtomicU64,
    closed: AtomicBool,
    counters: Counters,
}

impl LifetimeAllocator {
    /// Allocator with the given strategies and default configuration
    pub fn new(
        classifier: impl LifetimeClassifier + 'static,
        provider: impl RawProvider + 'static,
    ) -> Self {
        Self::from_parts(
            Arc::new(classifier),
            Arc::new(provider),
            AllocatorConfig::default(),
        )
    }

    /// Hash classifier over the system allocator
    pub fn with_defaults() -> Self {
        Self::new(HashClassifier::new(), SystemProvider::new())
    }

    pub fn builder() -> AllocatorBuilder {
        AllocatorBuilder::default()
    }

    fn from_parts(
        classifier: Arc<dyn LifetimeClassifier>,
        provider: Arc<dyn RawProvider>,
        config: AllocatorConfig,
    ) -> Self {
        let id = NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            allocator = id,
            classifier = classifier.name(),
            provider = provider.name(),
            reclaim = ?config.reclaim,
            "Lifetime allocator initialized"
        );
        Self {
            id,
            regions: RegionTable::new(config.region_capacity_hint),
            classifier,
            provider,
            global: Mutex::new(LedgerRegistry::default()),
            orphans: OrphanQueue::default(),
            config,
            next_block: AtomicU64::new(1),
            next_ledger: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn id(&self) -> AllocatorId {
        self.id
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn classifier(&self) -> &dyn LifetimeClassifier {
        self.classifier.as_ref()
    }

    /// Create and register a ledger for one caller
    ///
    /// Registration prunes dropped ledgers and reclaims their orphaned blocks.
    pub fn ledger(&self) -> Ledger {
        let ledger = Ledger::new(
            self.next_ledger.fetch_add(1, Ordering::Relaxed),
            self.id,
            self.orphans.clone(),
        );
        let mut registry = self.global.lock();
        let pruned = registry.prune();
        registry.register(ledger.cell());
        let orphans = self.reclaim_orphans(&registry);
        drop(registry);

        debug!(
            allocator = self.id,
            ledger = ledger.id(),
            pruned,
            orphans,
            "Ledger registered"
        );
        ledger
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn region(&self, class: LifetimeClass) -> &Region {
        self.regions.get(class)
    }

    /// Whether the block is registered in its class's region
    pub fn contains(&self, handle: &BlockHandle) -> bool {
        handle.allocator() == self.id && self.regions.get(handle.class()).contains(handle.id())
    }

    /// Region currently holding the block, if any
    pub fn locate(&self, handle: &BlockHandle) -> Option<LifetimeClass> {
        if handle.allocator() != self.id {
            return None;
        }
        let found = self.regions.locate(handle.id());
        if found.len() > 1 {
            warn!(block = handle.id(), regions = ?found, "Block registered in several regions");
        }
        found.first().copied()
    }

    pub fn live_count(&self, class: LifetimeClass) -> usize {
        self.regions.get(class).len()
    }

    pub fn live_blocks(&self, class: LifetimeClass) -> Vec<BlockHandle> {
        self.regions.get(class).snapshot()
    }

    pub fn stats(&self) -> AllocatorStats {
        let (ledgers, stale_entries) = {
            let registry = self.global.lock();
            let cells = registry.cells();
            let stale: usize = cells.iter().map(|cell| cell.lock().stale()).sum();
            (cells.len(), stale)
        };

        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        AllocatorStats {
            regions: self.regions.stats(),
            allocations: load(&self.counters.allocations),
            failed_allocations: load(&self.counters.failed_allocations),
            releases: load(&self.counters.releases),
            deferred_releases: load(&self.counters.deferred_releases),
            reclaimed_blocks: load(&self.counters.reclaimed),
            rejected_releases: load(&self.counters.rejected),
            sync_passes: load(&self.counters.sync_passes),
            purged_entries: load(&self.counters.purged),
            ledgers,
            stale_entries,
        }
    }

    pub(super) fn check_ledger(&self, ledger: &Ledger) -> MemoryResult<()> {
        if ledger.allocator() == self.id {
            Ok(())
        } else {
            Err(MemoryError::ForeignLedger {
                ledger: ledger.id(),
            })
        }
    }

    pub(super) fn check_handle(&self, handle: &BlockHandle) -> MemoryResult<()> {
        if handle.allocator() == self.id {
            Ok(())
        } else {
            Err(self.reject(MemoryError::UnknownBlock { block: handle.id() }))
        }
    }

    /// Why a ledger with no entry for `handle` cannot act on it
    pub(super) fn missing_entry(&self, ledger: &Ledger, handle: &BlockHandle) -> MemoryError {
        if handle.allocator() != self.id || handle.id() >= self.next_block.load(Ordering::SeqCst) {
            MemoryError::UnknownBlock { block: handle.id() }
        } else if self.orphans.lock().iter().any(|h| h.id() == handle.id()) {
            MemoryError::UseAfterReclaim { block: handle.id() }
        } else if self.regions.get(handle.class()).contains(handle.id()) {
            MemoryError::CrossThreadRelease {
                block: handle.id(),
                ledger: ledger.id(),
            }
        } else {
            MemoryError::UseAfterReclaim { block: handle.id() }
        }
    }

    pub(super) fn reject(&self, error: MemoryError) -> MemoryError {
        Counters::bump(&self.counters.rejected, 1);
        debug!(allocator = self.id, error = %error, "Request rejected");
        error
    }
}

impl std::fmt::Debug for LifetimeAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifetimeAllocator")
            .field("id", &self.id)
            .field("classifier", &self.classifier.name())
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("live_blocks", &self.regions.total_live())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for LifetimeAllocator {
    fn drop(&mut self) {
        if !self.is_closed() && self.regions.total_live() > 0 {
            warn!(
                allocator = self.id,
                live = self.regions.total_live(),
                "Allocator dropped with live blocks, draining"
            );
            self.drain();
        }
    }
}

/// Builder for [`LifetimeAllocator`]
#[derive(Default)]
pub struct AllocatorBuilder {
    classifier: Option<Arc<dyn LifetimeClassifier>>,
    provider: Option<Arc<dyn RawProvider>>,
    config: AllocatorConfig,
}

impl AllocatorBuilder {
    pub fn classifier(mut self, classifier: impl LifetimeClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn shared_classifier(mut self, classifier: Arc<dyn LifetimeClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn provider(mut self, provider: impl RawProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Provider the caller keeps a handle to (e.g. to inspect its counters)
    pub fn shared_provider(mut self, provider: Arc<dyn RawProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: AllocatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<LifetimeAllocator, ConfigError> {
        self.config.validate()?;
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(HashClassifier::with_default(self.config.default_class)));
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(SystemProvider::new()));
        Ok(LifetimeAllocator::from_parts(classifier, provider, self.config))
    }
}
