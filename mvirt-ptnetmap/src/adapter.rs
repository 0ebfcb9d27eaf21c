//! The observer-chain abstraction that replaces a parent adapter's
//! `notify` callback with one that wakes this core's workers, forwarding to
//! whatever the parent had installed before (§4.3, §9 design note on
//! "callback hijack via function-pointer swap").

use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::backend::SyncDirection;

/// The notification a backend adapter delivers when a ring has progressed.
/// Boxed rather than a raw function pointer, per the design note: the
/// original is retained by value and restored as an explicit stack
/// discipline, never pointer manipulation on a shared struct.
pub type NotifyCallback = Arc<dyn Fn(SyncDirection) + Send + Sync>;

/// The parent adapter's side of the hijack: whatever lets us read and
/// replace its current `notify` callback. Everything else the parent
/// adapter does (`register`, `txsync`, `rxsync`, `krings_create`,
/// `krings_delete`, `config`, `dtor`) is out of scope (§1) — this core only
/// ever touches `notify`.
pub trait ParentAdapter: Send + Sync {
    fn notify_callback(&self) -> NotifyCallback;
    fn set_notify_callback(&self, callback: NotifyCallback);
}

/// Installs a forwarding `notify` callback on a parent adapter and restores
/// the original on [`NotifyHijack::restore`] (or `Drop`, belt and braces).
///
/// `install` and `restore` are idempotent: a second `install` without an
/// intervening `restore` is a logic error in the caller (session lifecycle
/// only ever calls this once per `create`), but `restore` after an already
/// restored hijack is a harmless no-op, matching `DELETE`'s idempotence
/// requirement (§8).
pub struct NotifyHijack {
    parent: Arc<dyn ParentAdapter>,
    original: Mutex<Option<NotifyCallback>>,
}

impl NotifyHijack {
    /// Wraps `parent`, stashes its current `notify` callback, and installs
    /// a replacement that wakes the TX/RX workers via `tx_wake`/`rx_wake`
    /// before forwarding to the original — so any local, non-passthrough
    /// observer the parent already notifies keeps being notified.
    pub fn install(
        parent: Arc<dyn ParentAdapter>,
        tx_wake: Sender<()>,
        rx_wake: Sender<()>,
    ) -> Arc<Self> {
        let original = parent.notify_callback();
        let hijack = Arc::new(Self {
            parent: parent.clone(),
            original: Mutex::new(Some(original)),
        });

        let observed = hijack.clone();
        let forwarding: NotifyCallback = Arc::new(move |direction| {
            let wake = match direction {
                SyncDirection::Tx => &tx_wake,
                SyncDirection::Rx => &rx_wake,
            };
            // A full channel means a wake is already pending; dropping this
            // one is correct, not lossy, since the worker will re-observe
            // current CSB state when it runs.
            let _ = wake.try_send(());

            if let Some(original) = observed
                .original
                .lock()
                .expect("notify hijack mutex poisoned")
                .as_ref()
            {
                original(direction);
            }
        });

        parent.set_notify_callback(forwarding);
        hijack
    }

    /// Restores the parent's original `notify` callback. Safe to call more
    /// than once; only the first call has any effect.
    pub fn restore(&self) {
        if let Some(original) = self
            .original
            .lock()
            .expect("notify hijack mutex poisoned")
            .take()
        {
            debug!("restoring parent adapter's original notify callback");
            self.parent.set_notify_callback(original);
        }
    }
}

impl Drop for NotifyHijack {
    fn drop(&mut self) {
        self.restore();
    }
}
