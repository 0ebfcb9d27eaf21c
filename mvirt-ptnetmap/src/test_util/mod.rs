//! Synthetic backend and guest driver used to exercise the worker loop
//! deterministically, the in-tree analogue of a real backend adapter and a
//! real guest.
//!
//! Only compiled for tests (`#[cfg(test)]` in `lib.rs`), mirroring how the
//! teacher codebase keeps its virtqueue-driver simulation behind
//! `test_util` rather than shipping it in the production binary.

mod guest;
mod notifier;
mod sync_script;

pub use guest::SyntheticGuest;
pub use notifier::RecordingNotifier;
pub use sync_script::SyncScript;

use vm_memory::{GuestAddress, GuestMemoryAtomic, GuestMemoryMmap};

use crate::csb::Csb;

/// One guest page, large enough to hold a TX and an RX `csb_ring`.
pub const CSB_PAGE_SIZE: usize = 4096;

/// Maps a fresh, zeroed anonymous page and wraps it as a [`Csb`] at offset 0.
///
/// Stands in for the real CREATE path's "map the guest-supplied CSB
/// pointer"; here the page is host-anonymous rather than guest-backed,
/// which is fine since the CSB protocol layer does not care who backs the
/// mapping, only that accesses are fallible.
pub fn page_backed_memory() -> GuestMemoryAtomic<GuestMemoryMmap> {
    let mem = GuestMemoryMmap::from_ranges(&[(GuestAddress(0), CSB_PAGE_SIZE)])
        .expect("failed to map synthetic CSB page");
    GuestMemoryAtomic::new(mem)
}

pub fn fresh_csb() -> Csb {
    Csb::new(page_backed_memory(), GuestAddress(0))
}
