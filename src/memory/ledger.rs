/*!
 * Reference Ledgers
 *
 * A ledger records, for one caller context, the pending reference count of
 * every block that context owns. Counts change locally on each retain or
 * release; the global lock is only taken once a count reaches zero.
 *
 * A [`Ledger`] is `Send` but not `Sync`: it can move to another thread, but
 * only one thread operates on it at a time. Its state sits behind its own
 * lock, which the owner takes uncontended and the synchronizer takes (under
 * the global lock) when purging stale entries.
 *
 * Blocks still queued for batched reclamation when a ledger is dropped move to
 * the allocator's orphan queue, which the next reclamation under the global
 * lock empties.
 */

use super::types::BlockHandle;
use crate::core::types::{AllocatorId, BlockId, LedgerId, PendingCount};
use ahash::RandomState;
use parking_lot::{Mutex, MutexGuard};
use std::cell::Cell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Retired blocks left behind by dropped ledgers, shared with the allocator
pub(crate) type OrphanQueue = Arc<Mutex<Vec<BlockHandle>>>;

/// Result of touching a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryUpdate {
    /// Entry was positive; carries the new count
    Updated(PendingCount),
    /// Entry is at or below zero, or the block is queued for reclamation
    Stale,
    /// No entry and nothing queued for this block
    Missing,
}

/// Ledger contents
#[derive(Debug, Default)]
pub(crate) struct LedgerState {
    counts: HashMap<BlockId, PendingCount, RandomState>,
    /// Blocks whose count reached zero, awaiting batched reclamation
    retired: Vec<BlockHandle>,
}

impl LedgerState {
    pub fn record(&mut self, id: BlockId) {
        self.counts.insert(id, 1);
    }

    pub fn count(&self, id: BlockId) -> Option<PendingCount> {
        self.counts.get(&id).copied()
    }

    #[cfg(test)]
    pub fn count_mut(&mut self, id: BlockId) -> Option<&mut PendingCount> {
        self.counts.get_mut(&id)
    }

    /// Apply `delta` to a positive entry
    fn update(&mut self, id: BlockId, delta: PendingCount) -> EntryUpdate {
        if let Some(count) = self.counts.get_mut(&id) {
            if *count <= 0 {
                return EntryUpdate::Stale;
            }
            *count += delta;
            return EntryUpdate::Updated(*count);
        }
        if self.is_retired(id) {
            EntryUpdate::Stale
        } else {
            EntryUpdate::Missing
        }
    }

    pub fn decrement(&mut self, id: BlockId) -> EntryUpdate {
        self.update(id, -1)
    }

    pub fn increment(&mut self, id: BlockId) -> EntryUpdate {
        self.update(id, 1)
    }

    /// Remove a positive entry, handing back its count
    pub fn detach(&mut self, id: BlockId) -> EntryUpdate {
        match self.update(id, 0) {
            EntryUpdate::Updated(count) => {
                self.counts.remove(&id);
                EntryUpdate::Updated(count)
            }
            other => other,
        }
    }

    /// Insert an adopted count; an existing entry is left untouched
    pub fn insert(&mut self, id: BlockId, count: PendingCount) -> bool {
        match self.counts.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(count);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Remove the entry if it is no longer positive
    pub fn remove_stale(&mut self, id: BlockId) -> bool {
        match self.counts.get(&id) {
            Some(count) if *count <= 0 => {
                self.counts.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Drop every entry at or below zero, returning how many went
    pub fn purge_stale(&mut self) -> usize {
        let before = self.counts.len();
        self.counts.retain(|_, count| *count > 0);
        before - self.counts.len()
    }

    pub fn stale(&self) -> usize {
        self.counts.values().filter(|count| **count <= 0).count()
    }

    pub fn retire(&mut self, handle: BlockHandle) -> usize {
        self.retired.push(handle);
        self.retired.len()
    }

    pub fn is_retired(&self, id: BlockId) -> bool {
        self.retired.iter().any(|h| h.id() == id)
    }

    pub fn take_retired(&mut self) -> Vec<BlockHandle> {
        std::mem::take(&mut self.retired)
    }

    /// Forget everything; returns (entries, retired) dropped
    pub fn clear(&mut self) -> (usize, usize) {
        let dropped = (self.counts.len(), self.retired.len());
        self.counts.clear();
        self.retired.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }
}

/// Shared part of a ledger, reachable from the registry
#[derive(Debug)]
pub(crate) struct LedgerCell {
    id: LedgerId,
    state: Mutex<LedgerState>,
    orphans: OrphanQueue,
}

impl LedgerCell {
    pub fn id(&self) -> LedgerId {
        self.id
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock()
    }
}

/// Per-caller reference ledger
///
/// Obtained from [`LifetimeAllocator::ledger`](super::LifetimeAllocator::ledger)
/// and passed to every allocate/release made on behalf of one caller.
#[derive(Debug)]
pub struct Ledger {
    cell: Arc<LedgerCell>,
    allocator: AllocatorId,
    _not_sync: PhantomData<Cell<()>>,
}

impl Ledger {
    pub(crate) fn new(id: LedgerId, allocator: AllocatorId, orphans: OrphanQueue) -> Self {
        Self {
            cell: Arc::new(LedgerCell {
                id,
                state: Mutex::new(LedgerState::default()),
                orphans,
            }),
            allocator,
            _not_sync: PhantomData,
        }
    }

    pub fn id(&self) -> LedgerId {
        self.cell.id
    }

    /// Pending count for a block, if this ledger has an entry
    pub fn pending(&self, handle: &BlockHandle) -> Option<PendingCount> {
        self.cell.lock().count(handle.id())
    }

    /// Number of entries, stale ones included
    pub fn len(&self) -> usize {
        self.cell.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries at or below zero that have not been purged yet
    pub fn stale(&self) -> usize {
        self.cell.lock().stale()
    }

    /// Blocks waiting for batched reclamation
    pub fn retired(&self) -> usize {
        self.cell.lock().retired_len()
    }

    pub(crate) fn cell(&self) -> &Arc<LedgerCell> {
        &self.cell
    }

    pub(crate) fn allocator(&self) -> AllocatorId {
        self.allocator
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        let mut state = self.cell.lock();
        let retired = state.take_retired();
        if !retired.is_empty() {
            // Ledger lock before orphan lock; reclaimers never hold both
            debug!(
                ledger = self.cell.id,
                blocks = retired.len(),
                "Ledger dropped with retired blocks, handing them to the orphan queue"
            );
            self.cell.orphans.lock().extend(retired);
        }

        let live = state.len() - state.stale();
        if live > 0 {
            warn!(
                ledger = self.cell.id,
                live_references = live,
                "Ledger dropped with outstanding blocks; they stay registered until drain"
            );
        }
    }
}

/// Weak index of every ledger an allocator has handed out
///
/// Lives inside the allocator's global lock.
#[derive(Debug, Default)]
pub(crate) struct LedgerRegistry {
    ledgers: HashMap<LedgerId, Weak<LedgerCell>, RandomState>,
}

impl LedgerRegistry {
    pub fn register(&mut self, cell: &Arc<LedgerCell>) {
        self.ledgers.insert(cell.id(), Arc::downgrade(cell));
    }

    pub fn deregister(&mut self, id: LedgerId) {
        self.ledgers.remove(&id);
    }

    /// Forget registrations of dropped ledgers
    pub fn prune(&mut self) -> usize {
        let before = self.ledgers.len();
        self.ledgers.retain(|_, weak| weak.strong_count() > 0);
        before - self.ledgers.len()
    }

    /// Ledgers still alive; registrations of dropped ledgers are pruned
    pub fn live(&mut self) -> (Vec<Arc<LedgerCell>>, usize) {
        let mut live = Vec::with_capacity(self.ledgers.len());
        let before = self.ledgers.len();
        self.ledgers.retain(|_, weak| match weak.upgrade() {
            Some(cell) => {
                live.push(cell);
                true
            }
            None => false,
        });
        let pruned = before - self.ledgers.len();
        (live, pruned)
    }

    /// Ledgers still alive, without pruning
    pub fn cells(&self) -> Vec<Arc<LedgerCell>> {
        self.ledgers.values().filter_map(Weak::upgrade).collect()
    }

    /// Registrations, dropped ledgers included until pruned
    pub fn len(&self) -> usize {
        self.ledgers.len()
    }
}
