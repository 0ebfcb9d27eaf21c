//! Typed, ordered access to the Communication Status Block (CSB).
//!
//! The CSB is a page of guest memory mapped into the host and shared,
//! lock-free, between the guest driver and this core. Field offsets are
//! fixed for binary compatibility with existing guest drivers (§6 of the
//! spec) and must never change.
//!
//! Every accessor here returns a `Result`: the page is guest-controlled
//! memory and a fault must surface as [`CsbError`], never a host panic.

use std::sync::atomic::{fence, Ordering};

use vm_memory::{Address, Bytes, GuestAddress, GuestAddressSpace, GuestMemoryAtomic, GuestMemoryMmap};

use crate::error::CsbError;

/// `NAF_FORCE_RECLAIM` hint bit carried in `sync_flags`, asking the backend
/// to reclaim completed TX slots ahead of its usual schedule.
pub const NAF_FORCE_RECLAIM: u32 = 1 << 0;

const FIELD_WIDTH: u64 = 4; // every csb_ring field is a u32
const RING_FIELDS: u64 = 7;
/// Byte size of one `csb_ring` sub-struct.
pub const CSB_RING_SIZE: u64 = FIELD_WIDTH * RING_FIELDS;

const OFF_HEAD: u64 = 0;
const OFF_CUR: u64 = 4;
const OFF_HWCUR: u64 = 8;
const OFF_HWTAIL: u64 = 12;
const OFF_SYNC_FLAGS: u64 = 16;
const OFF_HOST_NEED_KICK: u64 = 20;
const OFF_GUEST_NEED_KICK: u64 = 24;

/// Which `csb_ring` sub-struct a [`CsbRingView`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingSelector {
    Tx,
    Rx,
}

/// Snapshot of the guest-owned fields of one `csb_ring`, taken together as
/// one "doublecheck" read. A torn read across the three fields is tolerable
/// per the spec; callers only rely on internal consistency up to the next
/// re-read.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestRingState {
    pub head: u32,
    pub cur: u32,
    pub sync_flags: u32,
}

/// View over one direction's `csb_ring` inside a mapped CSB page.
///
/// Holds only a base address and a handle to the mapped memory; cheap to
/// clone, safe to share across the TX and RX worker threads (each owns its
/// own `CsbRingView` over disjoint byte ranges).
#[derive(Clone)]
pub struct CsbRingView {
    mem: GuestMemoryAtomic<GuestMemoryMmap>,
    base: GuestAddress,
    selector: RingSelector,
}

impl CsbRingView {
    /// `base` is the address of `csb.tx_ring`; the RX view is derived at
    /// `base + CSB_RING_SIZE` by [`Csb::rx_ring`].
    fn new(mem: GuestMemoryAtomic<GuestMemoryMmap>, base: GuestAddress, selector: RingSelector) -> Self {
        Self {
            mem,
            base,
            selector,
        }
    }

    pub fn selector(&self) -> RingSelector {
        self.selector
    }

    fn addr(&self, offset: u64) -> GuestAddress {
        self.base.unchecked_add(offset)
    }

    fn read_u32(&self, offset: u64) -> Result<u32, CsbError> {
        self.mem
            .memory()
            .read_obj(self.addr(offset))
            .map_err(|source| CsbError {
                offset: self.base.raw_value() + offset,
                source,
            })
    }

    fn write_u32(&self, offset: u64, value: u32) -> Result<(), CsbError> {
        self.mem
            .memory()
            .write_obj(value, self.addr(offset))
            .map_err(|source| CsbError {
                offset: self.base.raw_value() + offset,
                source,
            })
    }

    /// Reads `head`, `cur` and `sync_flags` as last written by the guest.
    pub fn read_guest_state(&self) -> Result<GuestRingState, CsbError> {
        Ok(GuestRingState {
            head: self.read_u32(OFF_HEAD)?,
            cur: self.read_u32(OFF_CUR)?,
            sync_flags: self.read_u32(OFF_SYNC_FLAGS)?,
        })
    }

    pub fn write_sync_flags(&self, flags: u32) -> Result<(), CsbError> {
        self.write_u32(OFF_SYNC_FLAGS, flags)
    }

    pub fn read_hwcur(&self) -> Result<u32, CsbError> {
        self.read_u32(OFF_HWCUR)
    }

    pub fn read_hwtail(&self) -> Result<u32, CsbError> {
        self.read_u32(OFF_HWTAIL)
    }

    /// Publishes the host's new ring indices. Per invariant 2 of the spec,
    /// this is only ever called after the backend sync has returned, and a
    /// full fence separates this write from any subsequent read of
    /// `guest_need_kick` so the guest is guaranteed to observe it before the
    /// host decides whether a kick is still owed.
    pub fn publish_host_indices(&self, hwcur: u32, hwtail: u32) -> Result<(), CsbError> {
        self.write_u32(OFF_HWCUR, hwcur)?;
        self.write_u32(OFF_HWTAIL, hwtail)?;
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Clears `host_need_kick`. Called on entry to every wake cycle, before
    /// the guest's indices are even snapshotted.
    pub fn disarm_host_kick(&self) -> Result<(), CsbError> {
        self.write_u32(OFF_HOST_NEED_KICK, 0)
    }

    /// Sets `host_need_kick` and fences before any subsequent "doublecheck"
    /// read of the guest's `head`, closing the race between the worker's
    /// last read and the guest's next write.
    pub fn arm_host_kick(&self) -> Result<(), CsbError> {
        self.write_u32(OFF_HOST_NEED_KICK, 1)?;
        fence(Ordering::SeqCst);
        Ok(())
    }

    pub fn read_host_need_kick(&self) -> Result<bool, CsbError> {
        Ok(self.read_u32(OFF_HOST_NEED_KICK)? != 0)
    }

    pub fn read_guest_need_kick(&self) -> Result<bool, CsbError> {
        Ok(self.read_u32(OFF_GUEST_NEED_KICK)? != 0)
    }

    pub fn clear_guest_need_kick(&self) -> Result<(), CsbError> {
        self.write_u32(OFF_GUEST_NEED_KICK, 0)
    }

    // The following are written by the session at `create` time to seed a
    // consistent starting view, and otherwise only by the synthetic guest
    // driver in tests; a running guest owns these fields afterward.
    pub fn write_head(&self, head: u32) -> Result<(), CsbError> {
        self.write_u32(OFF_HEAD, head)
    }

    pub fn write_cur(&self, cur: u32) -> Result<(), CsbError> {
        self.write_u32(OFF_CUR, cur)
    }

    pub fn write_guest_need_kick(&self, armed: bool) -> Result<(), CsbError> {
        self.write_u32(OFF_GUEST_NEED_KICK, armed as u32)
    }
}

/// The full CSB: a TX ring and an RX ring back to back in one mapped page.
/// `additional guest fields` mentioned in §6 are outside this core's
/// concern and are never touched here.
pub struct Csb {
    mem: GuestMemoryAtomic<GuestMemoryMmap>,
    base: GuestAddress,
}

impl Csb {
    /// Wraps an already-mapped CSB page. `base` is the guest address of
    /// `csb.tx_ring` within `mem`.
    pub fn new(mem: GuestMemoryAtomic<GuestMemoryMmap>, base: GuestAddress) -> Self {
        Self { mem, base }
    }

    pub fn tx_ring(&self) -> CsbRingView {
        CsbRingView::new(self.mem.clone(), self.base, RingSelector::Tx)
    }

    pub fn rx_ring(&self) -> CsbRingView {
        CsbRingView::new(
            self.mem.clone(),
            self.base.unchecked_add(CSB_RING_SIZE),
            RingSelector::Rx,
        )
    }
}
