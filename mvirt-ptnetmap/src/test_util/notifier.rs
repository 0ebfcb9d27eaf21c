use std::sync::atomic::{AtomicU32, Ordering};

use crate::backend::{GuestNotifier, SyncDirection};

/// Records every injected interrupt instead of actually signaling a guest,
/// so tests can assert invariant 3 (§8): no interrupt while
/// `guest_need_kick == 0`.
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

    pub fn total(&self) -> u32 {
        self.tx_count() + self.rx_count()
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
