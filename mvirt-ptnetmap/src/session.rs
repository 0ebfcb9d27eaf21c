//! Passthrough session lifecycle (§4.3): parses the control-plane
//! configuration blob, owns both krings and the CSB, constructs (but does
//! not start) the TX/RX workers, and drives create/start/stop/destroy.

use std::os::unix::io::FromRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};
use vm_memory::{GuestAddress, GuestMemoryAtomic, GuestMemoryMmap};
use vmm_sys_util::eventfd::EventFd;

use crate::adapter::{NotifyHijack, ParentAdapter};
use crate::backend::{BackendSync, GuestNotifier, SyncDirection};
use crate::csb::Csb;
use crate::error::SessionError;
use crate::kring::Kring;
use crate::worker::{self, WorkerContext, PTN_RX_NOWORK_CYCLE};

/// Whether the backend's prologue validator runs before every sync call.
/// Resolved open question (§9); see DESIGN.md for the rationale. `Always`
/// is the default since the CSB is guest-controlled and assumed hostile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrologueMode {
    Always,
    Never,
}

/// One direction's doorbell/interrupt descriptors, carried through from the
/// configuration blob for wire-format fidelity. The worker loop itself
/// never touches these directly; draining `kick` into a worker wakeup and
/// signaling `call` on guest notification is the reactor glue this core
/// assumes exists around it (§1, out of scope) — within this crate, worker
/// wakeup instead flows through an in-process channel (see
/// [`NotifyHijack`]).
#[derive(Debug)]
pub struct RingDescriptor {
    pub kick: EventFd,
    pub call: EventFd,
}

/// Byte length of the fixed-layout configuration blob (§6): four `i32` fds,
/// one `u64` CSB address, two `u32` slot counts.
const CONFIG_BLOB_LEN: usize = 4 * 4 + 8 + 4 + 4;

/// Parsed, validated form of the control-plane `CREATE` argument.
pub struct SessionConfig {
    pub tx: RingDescriptor,
    pub rx: RingDescriptor,
    pub csb_addr: GuestAddress,
    pub num_tx_slots: u32,
    pub num_rx_slots: u32,
    pub prologue_mode: PrologueMode,
    pub rx_nowork_cycle_limit: u32,
}

impl SessionConfig {
    /// Parses and validates `blob`. The fds embedded in the blob are
    /// expected to already be duplicated for this process by the control
    /// plane (standard vhost-user/ioctl fd-passing discipline); ownership
    /// of each fd transfers to the returned `EventFd`.
    pub fn from_blob(blob: &[u8]) -> Result<Self, SessionError> {
        if blob.len() != CONFIG_BLOB_LEN {
            return Err(SessionError::BadConfigSize {
                expected: CONFIG_BLOB_LEN,
                actual: blob.len(),
            });
        }

        let read_i32 = |range: std::ops::Range<usize>| {
            i32::from_le_bytes(blob[range].try_into().expect("fixed-size slice"))
        };
        let read_u32 = |range: std::ops::Range<usize>| {
            u32::from_le_bytes(blob[range].try_into().expect("fixed-size slice"))
        };
        let read_u64 = |range: std::ops::Range<usize>| {
            u64::from_le_bytes(blob[range].try_into().expect("fixed-size slice"))
        };

        let tx_ioeventfd = read_i32(0..4);
        let tx_irqfd = read_i32(4..8);
        let rx_ioeventfd = read_i32(8..12);
        let rx_irqfd = read_i32(12..16);
        let csb_addr = read_u64(16..24);
        let num_tx_slots = read_u32(24..28);
        let num_rx_slots = read_u32(28..32);

        // SAFETY: the control plane guarantees these are valid, open,
        // process-local fds it is handing off ownership of.
        let (tx_kick, tx_call, rx_kick, rx_call) = unsafe {
            (
                EventFd::from_raw_fd(tx_ioeventfd),
                EventFd::from_raw_fd(tx_irqfd),
                EventFd::from_raw_fd(rx_ioeventfd),
                EventFd::from_raw_fd(rx_irqfd),
            )
        };

        Ok(Self {
            tx: RingDescriptor {
                kick: tx_kick,
                call: tx_call,
            },
            rx: RingDescriptor {
                kick: rx_kick,
                call: rx_call,
            },
            csb_addr: GuestAddress(csb_addr),
            num_tx_slots,
            num_rx_slots,
            prologue_mode: PrologueMode::Always,
            rx_nowork_cycle_limit: PTN_RX_NOWORK_CYCLE,
        })
    }
}

/// The handle `create` returns and `stop`/`destroy` consume, eliminating
/// any need for the control plane to look a session up through the
/// adapter (§9 design note).
pub type SessionHandle = PassthroughSession;

/// Owns everything a passthrough session needs.
pub struct PassthroughSession {
    tx_kring: Arc<Kring>,
    rx_kring: Arc<Kring>,
    configured: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    tx_wake_tx: crossbeam_channel::Sender<()>,
    rx_wake_tx: crossbeam_channel::Sender<()>,
    tx_ctx: Option<WorkerContext>,
    rx_ctx: Option<WorkerContext>,
    tx_handle: Option<JoinHandle<()>>,
    rx_handle: Option<JoinHandle<()>>,
    hijack: Option<Arc<NotifyHijack>>,
}

impl PassthroughSession {
    /// §4.3 `create`: validates the blob, snapshots initial ring state into
    /// the CSB, hijacks the parent adapter's notifications, and builds both
    /// workers without starting them.
    pub fn create(
        blob: &[u8],
        mem: GuestMemoryAtomic<GuestMemoryMmap>,
        backend: Arc<dyn BackendSync>,
        notifier: Arc<dyn GuestNotifier>,
        parent: Arc<dyn ParentAdapter>,
    ) -> Result<Self, SessionError> {
        let config = SessionConfig::from_blob(blob)?;
        let csb = Csb::new(mem, config.csb_addr);

        let tx_kring = Arc::new(Kring::new(config.num_tx_slots));
        let rx_kring = Arc::new(Kring::new(config.num_rx_slots));

        let tx_ring = csb.tx_ring();
        let rx_ring = csb.rx_ring();
        seed_csb_ring(&tx_ring, &tx_kring).map_err(SessionError::CsbMapping)?;
        seed_csb_ring(&rx_ring, &rx_kring).map_err(SessionError::CsbMapping)?;

        let configured = Arc::new(AtomicBool::new(true));
        let stopped = Arc::new(AtomicBool::new(true));
        let (tx_wake_tx, tx_wake_rx) = crossbeam_channel::bounded(1);
        let (rx_wake_tx, rx_wake_rx) = crossbeam_channel::bounded(1);

        let hijack = NotifyHijack::install(parent, tx_wake_tx.clone(), rx_wake_tx.clone());

        let tx_ctx = WorkerContext {
            direction: SyncDirection::Tx,
            csb: tx_ring,
            kring: tx_kring.clone(),
            backend: backend.clone(),
            notifier: notifier.clone(),
            configured: configured.clone(),
            stopped: stopped.clone(),
            wake: tx_wake_rx,
            prologue_mode: config.prologue_mode,
            rx_nowork_cycle_limit: config.rx_nowork_cycle_limit,
        };
        let rx_ctx = WorkerContext {
            direction: SyncDirection::Rx,
            csb: rx_ring,
            kring: rx_kring.clone(),
            backend,
            notifier,
            configured: configured.clone(),
            stopped: stopped.clone(),
            wake: rx_wake_rx,
            prologue_mode: config.prologue_mode,
            rx_nowork_cycle_limit: config.rx_nowork_cycle_limit,
        };

        info!(
            tx_slots = config.num_tx_slots,
            rx_slots = config.num_rx_slots,
            "passthrough session created"
        );

        Ok(Self {
            tx_kring,
            rx_kring,
            configured,
            stopped,
            tx_wake_tx,
            rx_wake_tx,
            tx_ctx: Some(tx_ctx),
            rx_ctx: Some(rx_ctx),
            tx_handle: None,
            rx_handle: None,
            hijack: Some(hijack),
        })
    }

    /// §4.3 `start`: spawns both worker threads. If RX fails to spawn, TX
    /// is stopped and joined before the error is returned, leaving no
    /// thread behind.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let tx_ctx = self.tx_ctx.take().ok_or(SessionError::AlreadyStarted)?;
        let rx_ctx = self.rx_ctx.take().ok_or(SessionError::AlreadyStarted)?;

        self.stopped.store(false, Ordering::Relaxed);

        let tx_handle = thread::Builder::new()
            .name("ptnetmap-tx".into())
            .spawn(move || worker::run(tx_ctx))
            .map_err(|e| SessionError::WorkerSpawn(e.to_string()))?;

        let rx_handle = match thread::Builder::new()
            .name("ptnetmap-rx".into())
            .spawn(move || worker::run(rx_ctx))
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "RX worker failed to spawn, stopping TX");
                self.stopped.store(true, Ordering::Relaxed);
                let _ = self.tx_wake_tx.send(());
                let _ = tx_handle.join();
                return Err(SessionError::WorkerSpawn(e.to_string()));
            }
        };

        self.tx_handle = Some(tx_handle);
        self.rx_handle = Some(rx_handle);
        info!("passthrough session started");
        Ok(())
    }

    /// §4.3 `stop`: flips `stopped`, wakes both workers so they observe it
    /// promptly, and joins them.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
        let _ = self.tx_wake_tx.send(());
        let _ = self.rx_wake_tx.send(());
        if let Some(handle) = self.tx_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.rx_handle.take() {
            let _ = handle.join();
        }
        info!("passthrough session stopped");
    }

    /// §4.3 `destroy`: stops both workers, restores the parent adapter's
    /// original notification callback, and drops everything. Consumes
    /// `self` — idempotence on an absent session is the control plane's
    /// responsibility (it simply has no handle to call this on).
    pub fn destroy(mut self) {
        self.configured.store(false, Ordering::Relaxed);
        self.stop();
        if let Some(hijack) = self.hijack.take() {
            hijack.restore();
        }
        info!("passthrough session destroyed");
    }

    pub fn tx_kring(&self) -> &Arc<Kring> {
        &self.tx_kring
    }

    pub fn rx_kring(&self) -> &Arc<Kring> {
        &self.rx_kring
    }
}

/// Writes a kring's current `hwcur`/`hwtail`/`rhead`/`rcur` into its CSB
/// ring so the guest's first read sees a consistent, zeroed starting point
/// rather than whatever was in the (possibly reused) guest page.
fn seed_csb_ring(ring: &crate::csb::CsbRingView, kring: &Kring) -> Result<(), String> {
    let state = kring.snapshot();
    ring.publish_host_indices(state.hwcur, state.hwtail)
        .map_err(|e| e.to_string())?;
    ring.write_head(state.rhead).map_err(|e| e.to_string())?;
    ring.write_cur(state.rcur).map_err(|e| e.to_string())?;
    Ok(())
}
