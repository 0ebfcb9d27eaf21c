use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::backend::{BackendSync, SyncDirection, SyncOutcome};
use crate::error::BackendSyncError;
use crate::kring::{mod_add, KringState};

/// Scriptable backend adapter: each call to [`BackendSync::sync`] advances
/// `hwtail` by the next queued amount (0 if the queue is empty) and reports
/// `hwcur` caught up to whatever the worker installed as `rhead`.
///
/// This is the "synthetic backend adapter" the spec's end-to-end harness
/// calls for (§8): a scripted `nm_sync` is enough to deterministically
/// drive every boundary scenario.
#[derive(Default)]
pub struct SyncScript {
    advances: Mutex<VecDeque<u32>>,
    fail_next: AtomicBool,
    prologue_fail_next: AtomicBool,
    calls: AtomicU32,
}

impl SyncScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one more `sync()` call to advance `hwtail` by `amount`.
    pub fn push_advance(&self, amount: u32) {
        self.advances.lock().unwrap().push_back(amount);
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_prologue(&self) {
        self.prologue_fail_next.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BackendSync for SyncScript {
    fn sync(
        &self,
        _direction: SyncDirection,
        kring: &KringState,
    ) -> Result<SyncOutcome, BackendSyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BackendSyncError::Sync("scripted backend failure".into()));
        }
        let advance = self.advances.lock().unwrap().pop_front().unwrap_or(0);
        let hwtail = mod_add(kring.hwtail, advance, kring.num_slots);
        Ok(SyncOutcome {
            hwcur: kring.rhead,
            hwtail,
        })
    }

    fn prologue(
        &self,
        _direction: SyncDirection,
        _kring: &KringState,
    ) -> Result<(), BackendSyncError> {
        if self.prologue_fail_next.swap(false, Ordering::SeqCst) {
            return Err(BackendSyncError::Prologue("scripted prologue failure".into()));
        }
        Ok(())
    }
}
