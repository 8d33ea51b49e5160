//! `CorrelationTable` — pending asynchronous calls keyed by `CmdId`.
//!
//! Ids are allocated from 1 upward, wrap past `u32::MAX` back to 1, and
//! skip ids that are still pending. `CmdId::SYNC` is never handed out.
//!
//! Reaped ids stay reserved (tombstoned) until the host's late reply
//! arrives, so a late reply is never matched to a newer call. A host that
//! never answers would grow the tombstone set forever, so it is capped at
//! `DEFAULT_REAPED_CAP`; past the cap the oldest tombstone is released.
//!
//! The table is behind a `Mutex` since deliveries may arrive on a host
//! thread. Callers complete slots only after the entry is removed and the
//! lock released.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use hostcall_core::envelope::CmdId;
use hostcall_core::error::{DispatchError, Result};

use crate::completion::{CallHandle, CompletionSlot};

/// Tombstones kept before the oldest is released for reuse.
pub const DEFAULT_REAPED_CAP: usize = 4096;

/// One outstanding asynchronous call.
pub struct PendingCall {
    pub cmd_id: CmdId,
    pub issued_at: Instant,
    pub slot: Arc<CompletionSlot>,
}

struct Inner {
    pending: HashMap<CmdId, PendingCall>,
    reaped: HashSet<CmdId>,
    /// Reap order, oldest first. Same ids as `reaped`.
    reaped_order: VecDeque<CmdId>,
    reaped_cap: usize,
    /// Next id to try. Never 0.
    next_id: u32,
}

pub struct CorrelationTable {
    inner: Mutex<Inner>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Table whose first allocated id is `first` (0 is bumped to 1).
    pub fn starting_at(first: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                reaped: HashSet::new(),
                reaped_order: VecDeque::new(),
                reaped_cap: DEFAULT_REAPED_CAP,
                next_id: first.max(1),
            }),
        }
    }

    /// Keep at most `cap` tombstones.
    pub fn reaped_cap(self, cap: usize) -> Self {
        self.lock().reaped_cap = cap;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Allocate a free id and register a pending call for it.
    pub fn allocate(&self) -> CallHandle {
        let mut inner = self.lock();
        let mut id = inner.next_id;
        while inner.in_use(CmdId::new(id)) {
            id = next(id);
        }
        inner.next_id = next(id);

        let cmd_id = CmdId::new(id);
        let slot = Arc::new(CompletionSlot::new());
        inner.pending.insert(cmd_id, PendingCall {
            cmd_id,
            issued_at: Instant::now(),
            slot: Arc::clone(&slot),
        });
        CallHandle::new(cmd_id, slot)
    }

    /// Register a pending call under a caller-chosen id.
    pub fn insert(&self, cmd_id: CmdId) -> Result<CallHandle> {
        if cmd_id.is_sync() {
            return Err(DispatchError::Config("correlation id 0 is reserved for sync calls"));
        }
        let mut inner = self.lock();
        if inner.in_use(cmd_id) {
            return Err(DispatchError::DuplicateCorrelationId(cmd_id));
        }
        let slot = Arc::new(CompletionSlot::new());
        inner.pending.insert(cmd_id, PendingCall {
            cmd_id,
            issued_at: Instant::now(),
            slot: Arc::clone(&slot),
        });
        Ok(CallHandle::new(cmd_id, slot))
    }

    /// Remove and return the pending call for `cmd_id`.
    pub fn remove(&self, cmd_id: CmdId) -> Option<PendingCall> {
        self.lock().pending.remove(&cmd_id)
    }

    /// Remove every call issued more than `max_age` before `now`.
    ///
    /// Their ids stay tombstoned until `clear_reaped` or until the cap
    /// pushes them out.
    pub fn take_expired(&self, max_age: Duration, now: Instant) -> Vec<PendingCall> {
        let mut inner = self.lock();
        let mut expired: Vec<CmdId> = inner
            .pending
            .values()
            .filter(|p| now.saturating_duration_since(p.issued_at) > max_age)
            .map(|p| p.cmd_id)
            .collect();
        expired.sort_unstable();
        for &id in &expired {
            inner.tombstone(id);
        }
        expired
            .into_iter()
            .filter_map(|id| inner.pending.remove(&id))
            .collect()
    }

    /// Drop the tombstone for a reaped id. `false` if it was not reaped.
    pub fn clear_reaped(&self, cmd_id: CmdId) -> bool {
        let mut inner = self.lock();
        if !inner.reaped.remove(&cmd_id) {
            return false;
        }
        inner.reaped_order.retain(|&id| id != cmd_id);
        true
    }

    pub fn reaped_len(&self) -> usize {
        self.lock().reaped.len()
    }

    pub fn contains(&self, cmd_id: CmdId) -> bool {
        self.lock().pending.contains_key(&cmd_id)
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn in_use(&self, cmd_id: CmdId) -> bool {
        self.pending.contains_key(&cmd_id) || self.reaped.contains(&cmd_id)
    }

    fn tombstone(&mut self, cmd_id: CmdId) {
        if self.reaped.insert(cmd_id) {
            self.reaped_order.push_back(cmd_id);
        }
        while self.reaped.len() > self.reaped_cap {
            match self.reaped_order.pop_front() {
                Some(oldest) => {
                    self.reaped.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn next(id: u32) -> u32 {
    if id == u32::MAX { 1 } else { id + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let table = CorrelationTable::new();
        let ids: Vec<u32> = (0..3).map(|_| table.allocate().cmd_id().as_u32()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_wraps_and_skips_pending() {
        let table = CorrelationTable::starting_at(u32::MAX);
        let a = table.allocate();
        assert_eq!(a.cmd_id(), CmdId::new(u32::MAX));
        let b = table.allocate();
        assert_eq!(b.cmd_id(), CmdId::new(1));

        // 2 taken by hand, so the allocator must step over it.
        let _c = table.insert(CmdId::new(2)).unwrap();
        assert_eq!(table.allocate().cmd_id(), CmdId::new(3));
    }

    #[test]
    fn test_duplicate_rejected() {
        let table = CorrelationTable::new();
        let _h = table.insert(CmdId::new(7)).unwrap();
        assert!(matches!(
            table.insert(CmdId::new(7)),
            Err(DispatchError::DuplicateCorrelationId(id)) if id == CmdId::new(7)
        ));
        assert!(table.insert(CmdId::SYNC).is_err());
    }

    #[test]
    fn test_remove_once() {
        let table = CorrelationTable::new();
        let h = table.allocate();
        assert!(table.remove(h.cmd_id()).is_some());
        assert!(table.remove(h.cmd_id()).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_take_expired() {
        let table = CorrelationTable::new();
        let old = table.allocate();
        let later = Instant::now() + Duration::from_secs(10);
        let expired = table.take_expired(Duration::from_secs(5), later);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].cmd_id, old.cmd_id());
        assert!(table.is_empty());

        let _fresh = table.allocate();
        assert!(table.take_expired(Duration::from_secs(5), Instant::now()).is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reaped_id_not_reused_until_cleared() {
        let table = CorrelationTable::starting_at(u32::MAX);
        let old = table.allocate();
        table.take_expired(Duration::ZERO, Instant::now() + Duration::from_secs(1));
        assert_eq!(table.reaped_len(), 1);
        assert!(table.insert(old.cmd_id()).is_err());

        assert!(table.clear_reaped(old.cmd_id()));
        assert!(!table.clear_reaped(old.cmd_id()));
        assert!(table.insert(old.cmd_id()).is_ok());
    }

    #[test]
    fn test_tombstones_capped() {
        let table = CorrelationTable::new().reaped_cap(2);
        let ids: Vec<CmdId> = (0..3).map(|_| table.allocate().cmd_id()).collect();
        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(table.take_expired(Duration::ZERO, later).len(), 3);

        // Oldest tombstone released, the two newest still reserved.
        assert_eq!(table.reaped_len(), 2);
        assert!(!table.clear_reaped(ids[0]));
        assert!(table.insert(ids[0]).is_ok());
        assert!(table.insert(ids[1]).is_err());
        assert!(table.insert(ids[2]).is_err());
    }
}
