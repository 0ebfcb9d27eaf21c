//! The `CREATE`/`DELETE` control-plane entry points (§6). Holds at most one
//! active session; busy/absent-session bookkeeping lives here rather than
//! in [`PassthroughSession`] so `DELETE` with no active session is a
//! trivially idempotent no-op and `CREATE` can reject a second session
//! without the session type needing to know about "the other one".

use std::sync::{Arc, Mutex};

use nix::errno::Errno;
use tracing::{info, warn};
use vm_memory::{GuestMemoryAtomic, GuestMemoryMmap};

use crate::adapter::ParentAdapter;
use crate::backend::{BackendSync, GuestNotifier};
use crate::error::{ControlError, SessionError};
use crate::session::{PassthroughSession, SessionHandle};

/// One adapter's passthrough control surface.
pub struct PassthroughControl {
    active: Mutex<Option<SessionHandle>>,
}

impl PassthroughControl {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// `CREATE`: parses and validates the configuration blob, fails if a
    /// session is already active, otherwise creates and starts one. On any
    /// failure after the session object exists, it is torn down before the
    /// error is returned — no side effects persist (§7).
    pub fn create(
        &self,
        blob: &[u8],
        mem: GuestMemoryAtomic<GuestMemoryMmap>,
        backend: Arc<dyn BackendSync>,
        notifier: Arc<dyn GuestNotifier>,
        parent: Arc<dyn ParentAdapter>,
    ) -> Result<(), ControlError> {
        let mut active = self.active.lock().expect("control mutex poisoned");
        if active.is_some() {
            warn!("CREATE rejected: adapter already in passthrough mode");
            return Err(ControlError::Session(SessionError::AdapterBusy));
        }

        let mut session = PassthroughSession::create(blob, mem, backend, notifier, parent)?;
        if let Err(err) = session.start() {
            warn!(error = %err, "session failed to start, tearing down");
            session.destroy();
            return Err(err.into());
        }

        *active = Some(session);
        info!("CREATE succeeded");
        Ok(())
    }

    /// `DELETE`: stops and tears down the active session, if any. Idempotent.
    pub fn delete(&self) {
        let mut active = self.active.lock().expect("control mutex poisoned");
        match active.take() {
            Some(session) => {
                session.destroy();
                info!("DELETE succeeded");
            }
            None => info!("DELETE no-op: no active session"),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().expect("control mutex poisoned").is_some()
    }
}

impl Default for PassthroughControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a [`ControlError`] to the kernel errno the spec's `CREATE`/`DELETE`
/// surface promises (§6, §7). Kept separate from [`ControlError`] itself so
/// the mapping happens once, at the outermost ioctl-style boundary, rather
/// than being baked into the error type (§10.2).
pub fn to_errno(err: &ControlError) -> Errno {
    match err {
        ControlError::NoSession => Errno::ENODEV,
        ControlError::Session(SessionError::BadConfigSize { .. }) => Errno::EINVAL,
        ControlError::Session(SessionError::CsbMapping(_)) => Errno::EFAULT,
        ControlError::Session(SessionError::AdapterBusy) => Errno::EBUSY,
        ControlError::Session(SessionError::AlreadyStarted) => Errno::EBUSY,
        ControlError::Session(SessionError::WorkerSpawn(_)) => Errno::ENOMEM,
        ControlError::Session(SessionError::OutOfMemory(_)) => Errno::ENOMEM,
    }
}
