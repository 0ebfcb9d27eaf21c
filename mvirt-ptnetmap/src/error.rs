//! Error types for the passthrough core.
//!
//! Runtime errors inside a worker loop never propagate to a caller (there is
//! none); they are logged once and turned into a re-armed host-kick. Only
//! control-plane errors (`create`/`destroy`) are returned to a caller, and
//! those are mapped to `nix::errno::Errno` at the outermost boundary.

use thiserror::Error;

/// Failure accessing a field of the shared control block.
///
/// The CSB lives in guest-controlled memory; any access can fault if the
/// guest has torn down or never mapped the page. This must never panic or
/// crash the host, so every CSB access returns a `Result`.
#[derive(Debug, Error)]
#[error("CSB access fault at offset {offset}: {source}")]
pub struct CsbError {
    pub offset: u64,
    #[source]
    pub source: vm_memory::GuestMemoryError,
}

/// Failure from the backend adapter's ring synchronization call.
#[derive(Debug, Error)]
pub enum BackendSyncError {
    #[error("backend sync failed: {0}")]
    Sync(String),
    #[error("prologue validation failed: {0}")]
    Prologue(String),
}

/// Errors surfaced by the ring-sync worker loop. None of these escape the
/// worker thread; they are caught at the top of one wake cycle and turned
/// into a log line plus a re-armed host-kick.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Csb(#[from] CsbError),
    #[error(transparent)]
    Backend(#[from] BackendSyncError),
}

/// Session lifecycle errors (`create`/`start`/`stop`/`destroy`).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration blob has wrong size: expected {expected}, got {actual}")]
    BadConfigSize { expected: usize, actual: usize },

    #[error("failed to map CSB: {0}")]
    CsbMapping(String),

    #[error("adapter is already in passthrough mode")]
    AdapterBusy,

    #[error("session was already started")]
    AlreadyStarted,

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    #[error("allocation failed: {0}")]
    OutOfMemory(String),
}

/// Top-level control-plane error, carrying the kernel errno this condition
/// maps to (see `control::to_errno`).
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("no active session")]
    NoSession,
}
