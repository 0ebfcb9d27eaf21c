//! The host's canonical view of one ring direction, and the modular
//! arithmetic every batching/fullness decision in the worker loop is built
//! from.

use std::sync::Mutex;

/// `(a - b) mod num_slots`, the "how many slots between b and a" primitive
/// invariant 1 of the spec defines batch size in terms of.
pub fn mod_sub(a: u32, b: u32, num_slots: u32) -> u32 {
    debug_assert!(num_slots > 0);
    let n = i64::from(num_slots);
    (i64::from(a) - i64::from(b)).rem_euclid(n) as u32
}

/// `(a + b) mod num_slots`.
pub fn mod_add(a: u32, b: u32, num_slots: u32) -> u32 {
    debug_assert!(num_slots > 0);
    let n = u64::from(num_slots);
    ((u64::from(a) + u64::from(b)) % n) as u32
}

/// The slot immediately before `x`, wrapping at `num_slots`.
pub fn prev(x: u32, num_slots: u32) -> u32 {
    if x == 0 {
        num_slots - 1
    } else {
        x - 1
    }
}

/// The host-side state for one ring direction (§3). `num_slots` is fixed at
/// creation; everything else is mutated only while the kring's [`Mutex`] is
/// held, which is also how the "at most one worker runnable at a time"
/// invariant (§3 invariant 6) is enforced.
#[derive(Debug, Clone, Copy)]
pub struct KringState {
    pub hwcur: u32,
    pub hwtail: u32,
    pub rhead: u32,
    pub rcur: u32,
    pub rtail: u32,
    pub num_slots: u32,
}

impl KringState {
    pub fn new(num_slots: u32) -> Self {
        assert!(num_slots > 0, "a ring must have at least one slot");
        Self {
            hwcur: 0,
            hwtail: 0,
            rhead: 0,
            rcur: 0,
            rtail: 0,
            num_slots,
        }
    }

    /// `(head - hwcur) mod num_slots`, the raw batch size before any cap is
    /// applied.
    pub fn batch_from(&self, guest_head: u32) -> u32 {
        mod_sub(guest_head, self.hwcur, self.num_slots)
    }

    /// Installs the guest-supplied indices onto the kring as the backend is
    /// about to see them (§4.2 step 5.c).
    pub fn install_guest_indices(&mut self, head: u32, cur: u32) {
        self.rhead = head;
        self.rcur = cur;
    }

    /// On prologue failure, reinitializes the ring from guest-supplied
    /// indices, trusting the guest minimally: only `rhead`/`rcur` are
    /// overwritten, never the host's own `hwcur`/`hwtail`.
    pub fn reinit_from_guest(&mut self, head: u32, cur: u32) {
        self.rhead = head;
        self.rcur = cur;
    }
}

/// Exclusive access to a [`KringState`], acquired via try-lock so a worker
/// never blocks waiting for a ring a concurrent local consumer holds.
pub struct Kring {
    state: Mutex<KringState>,
}

impl Kring {
    pub fn new(num_slots: u32) -> Self {
        Self {
            state: Mutex::new(KringState::new(num_slots)),
        }
    }

    /// Snapshots the current state without taking ownership — used by
    /// `create` to seed the CSB before any worker has run.
    pub fn snapshot(&self) -> KringState {
        *self.state.lock().expect("kring mutex poisoned")
    }

    /// Non-blocking acquire. Returns `None` if another context (a worker,
    /// or in principle a non-passthrough local consumer) already holds it;
    /// the caller must not perform any CSB side effect in that case.
    pub fn try_acquire(&self) -> Option<std::sync::MutexGuard<'_, KringState>> {
        self.state.try_lock().ok()
    }
}
