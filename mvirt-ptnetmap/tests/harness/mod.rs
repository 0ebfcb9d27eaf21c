//! Integration-test harness: a scriptable backend, a synthetic guest
//! driver, and an interrupt-counting notifier, built only on the crate's
//! public API (mirrors `src/test_util`, which backs the unit tests, but
//! this copy exercises the crate the way an external consumer would).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use mvirt_ptnetmap::{
    BackendSyncError, BackendSync, Csb, CsbRingView, GuestNotifier, KringState, SyncDirection,
    SyncOutcome,
};
use vm_memory::{GuestAddress, GuestMemoryAtomic, GuestMemoryMmap};

pub const CSB_PAGE_SIZE: usize = 4096;

pub fn fresh_csb() -> Csb {
    let mem = GuestMemoryMmap::from_ranges(&[(GuestAddress(0), CSB_PAGE_SIZE)])
        .expect("failed to map synthetic CSB page");
    Csb::new(GuestMemoryAtomic::new(mem), GuestAddress(0))
}

#[derive(Default)]
pub struct SyncScript {
    advances: Mutex<VecDeque<u32>>,
    fail_next: AtomicBool,
    calls: AtomicU32,
    max_batch: AtomicU32,
}

impl SyncScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_advance(&self, amount: u32) {
        self.advances.lock().unwrap().push_back(amount);
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Largest `(rhead - hwcur) mod num_slots` observed across all calls —
    /// used to check the batching cap from outside the crate.
    pub fn max_batch(&self) -> u32 {
        self.max_batch.load(Ordering::SeqCst)
    }
}

impl BackendSync for SyncScript {
    fn sync(&self, _direction: SyncDirection, kring: &KringState) -> Result<SyncOutcome, BackendSyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BackendSyncError::Sync("scripted backend failure".into()));
        }
        let batch = (kring.rhead + kring.num_slots - kring.hwcur) % kring.num_slots;
        self.max_batch.fetch_max(batch, Ordering::SeqCst);

        let advance = self.advances.lock().unwrap().pop_front().unwrap_or(0);
        let hwtail = (kring.hwtail + advance) % kring.num_slots;
        Ok(SyncOutcome {
            hwcur: kring.rhead,
            hwtail,
        })
    }
}

pub struct SyntheticGuest {
    ring: CsbRingView,
}

impl SyntheticGuest {
    pub fn new(ring: CsbRingView) -> Self {
        Self { ring }
    }

    pub fn advance_head(&self, new_head: u32) {
        self.ring.write_head(new_head).expect("guest write head");
        self.ring.write_cur(new_head).expect("guest write cur");
    }

    pub fn arm_interrupt(&self) {
        self.ring
            .write_guest_need_kick(true)
            .expect("guest arm interrupt");
    }

    pub fn host_need_kick(&self) -> bool {
        self.ring.read_host_need_kick().expect("read host_need_kick")
    }

    pub fn hwtail(&self) -> u32 {
        self.ring.read_hwtail().expect("read hwtail")
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    tx_count: AtomicU32,
    rx_count: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tx_count(&self) -> u32 {
        self.tx_count.load(Ordering::SeqCst)
    }

    pub fn rx_count(&self) -> u32 {
        self.rx_count.load(Ordering::SeqCst)
    }
}

impl GuestNotifier for RecordingNotifier {
    fn inject_irq(&self, direction: SyncDirection) {
        match direction {
            SyncDirection::Tx => self.tx_count.fetch_add(1, Ordering::SeqCst),
            SyncDirection::Rx => self.rx_count.fetch_add(1, Ordering::SeqCst),
        };
    }
}
