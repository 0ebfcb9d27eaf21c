//! Host-side passthrough engine: paravirtualized producer/consumer
//! coordination between a guest's view of a TX/RX ring pair and a backend
//! packet-I/O adapter, mediated by a shared control block (CSB).

pub mod adapter;
pub mod backend;
pub mod control;
pub mod csb;
pub mod error;
pub mod kring;
pub mod session;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_util;

pub use adapter::{NotifyCallback, NotifyHijack, ParentAdapter};
pub use backend::{BackendSync, GuestNotifier, SyncDirection, SyncOutcome};
pub use control::PassthroughControl;
pub use csb::{Csb, CsbRingView, RingSelector, CSB_RING_SIZE, NAF_FORCE_RECLAIM};
pub use error::{BackendSyncError, ControlError, CsbError, SessionError, WorkerError};
pub use kring::{Kring, KringState};
pub use session::{PassthroughSession, PrologueMode, SessionConfig, SessionHandle};
pub use worker::{WorkerContext, PTN_RX_NOWORK_CYCLE};
