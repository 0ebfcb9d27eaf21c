//! The external collaborators the ring-sync loop calls into: the backend
//! adapter's sync/prologue primitive, and the guest-facing interrupt
//! injector. Both are out of scope for this core (§1) and are modeled as
//! traits the session wires up at `create` time.

use crate::error::BackendSyncError;
use crate::kring::KringState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Tx,
    Rx,
}

/// The host indices the backend reports after reconciling hardware state
/// with the ring.
#[derive(Debug, Clone, Copy)]
pub struct SyncOutcome {
    pub hwcur: u32,
    pub hwtail: u32,
}

/// The backend adapter's ring synchronization primitive (`nm_sync`) and its
/// optional prologue validator. Out of scope per §1; this core only calls
/// into it.
pub trait BackendSync: Send + Sync {
    /// Reconciles hardware state with `kring`, returning the new
    /// `hwcur`/`hwtail`. Must not be called while holding anything other
    /// than the kring's own exclusive lock.
    fn sync(&self, direction: SyncDirection, kring: &KringState)
    -> Result<SyncOutcome, BackendSyncError>;

    /// Validates guest-supplied indices before they are installed into the
    /// kring. The default accepts everything; [`crate::session::PrologueMode::Never`]
    /// skips calling this at all (§9 open question, resolved in DESIGN.md).
    fn prologue(
        &self,
        _direction: SyncDirection,
        _kring: &KringState,
    ) -> Result<(), BackendSyncError> {
        Ok(())
    }
}

/// Host-to-guest interrupt injection. Out of scope per §1 (the actual
/// privileged injection into a running guest is a property of the
/// hypervisor, not this core); the worker loop only ever decides *whether*
/// to call this, never how the injection itself is delivered.
pub trait GuestNotifier: Send + Sync {
    fn inject_irq(&self, direction: SyncDirection);
}
