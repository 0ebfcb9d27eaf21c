//! The ring-sync worker loop (§4.2): the core of this crate. One instance
//! runs for TX, one for RX, sharing everything but the fullness predicate
//! and the TX-only batching/reclaim steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, trace, warn};

use crate::backend::{BackendSync, GuestNotifier, SyncDirection};
use crate::csb::{CsbRingView, NAF_FORCE_RECLAIM};
use crate::error::WorkerError;
use crate::kring::{mod_add, mod_sub, prev, Kring};
use crate::session::PrologueMode;

/// Consecutive no-work RX iterations before the worker gives up polling and
/// waits on the backend rather than the guest (§4.2, §5).
pub const PTN_RX_NOWORK_CYCLE: u32 = 10;

/// The arm-then-doublecheck stabilization delay (§5, suspension point 3).
const MICROSLEEP: Duration = Duration::from_micros(1);

/// Everything one worker needs; owned by [`crate::session::PassthroughSession`]
/// and handed to the worker thread at `start`.
pub struct WorkerContext {
    pub direction: SyncDirection,
    pub csb: CsbRingView,
    pub kring: Arc<Kring>,
    pub backend: Arc<dyn BackendSync>,
    pub notifier: Arc<dyn GuestNotifier>,
    pub configured: Arc<AtomicBool>,
    pub stopped: Arc<AtomicBool>,
    pub wake: Receiver<()>,
    pub prologue_mode: PrologueMode,
    /// Consecutive no-work RX iterations tolerated before giving up
    /// polling (§10.3 policy knob); unused by the TX direction.
    pub rx_nowork_cycle_limit: u32,
}

/// Runs until `ctx.wake` disconnects (the session dropped its sender as
/// part of `stop`/`destroy`) or a received wake finds the session stopped.
/// Thin by design: all the interesting behavior is in [`process_one_wake`].
pub fn run(ctx: WorkerContext) {
    loop {
        if ctx.wake.recv().is_err() {
            debug!(direction = ?ctx.direction, "wake channel closed, worker exiting");
            return;
        }
        if let Err(err) = process_one_wake(&ctx) {
            warn!(direction = ?ctx.direction, error = %err, "worker iteration failed");
        }
        if ctx.stopped.load(Ordering::Relaxed) {
            return;
        }
    }
}

/// One full wake cycle: §4.2 steps 1 through 6.
fn process_one_wake(ctx: &WorkerContext) -> Result<(), WorkerError> {
    // Step 1: entry gate.
    if !ctx.configured.load(Ordering::Relaxed) || ctx.stopped.load(Ordering::Relaxed) {
        return Ok(());
    }

    // Step 2: try-acquire the kring.
    let Some(mut kring) = ctx.kring.try_acquire() else {
        warn!(direction = ?ctx.direction, "kring busy, exiting wake cycle");
        return Ok(());
    };

    // Step 3: disarm host-kick.
    ctx.csb.disarm_host_kick()?;

    // Step 4: snapshot guest indices.
    let mut guest = ctx.csb.read_guest_state()?;
    let mut work = false;
    let mut cycle_nowork: u32 = 0;

    loop {
        let mut g_head = guest.head;

        if ctx.direction == SyncDirection::Tx {
            // 5.a batching cap.
            let cap = kring.num_slots / 2;
            let batch = kring.batch_from(g_head);
            if batch > cap {
                g_head = mod_add(kring.hwcur, cap, kring.num_slots);
            }

            // 5.b reclaim hint: available space = num_slots - slots the
            // guest has produced but the backend has not yet completed.
            let in_flight = mod_sub(g_head, kring.hwtail, kring.num_slots);
            let avail = kring.num_slots - in_flight;
            if avail <= kring.num_slots / 2 {
                let flags = guest.sync_flags | NAF_FORCE_RECLAIM;
                ctx.csb.write_sync_flags(flags)?;
            }
        }

        // 5.c install guest indices, optionally validated by the prologue.
        kring.install_guest_indices(g_head, guest.cur);
        if ctx.prologue_mode == PrologueMode::Always {
            if let Err(err) = ctx.backend.prologue(ctx.direction, &kring) {
                warn!(direction = ?ctx.direction, error = %err, "prologue failed, reinitializing ring");
                kring.reinit_from_guest(g_head, guest.cur);
                ctx.csb.arm_host_kick()?;
                break;
            }
        }

        // 5.d backend sync.
        match ctx.backend.sync(ctx.direction, &kring) {
            Ok(outcome) => {
                kring.hwcur = outcome.hwcur;
                kring.hwtail = outcome.hwtail;
            }
            Err(err) => {
                warn!(direction = ?ctx.direction, error = %err, "backend sync failed");
                ctx.csb.arm_host_kick()?;
                break;
            }
        }

        // 5.e publish host indices.
        ctx.csb.publish_host_indices(kring.hwcur, kring.hwtail)?;
        if kring.hwtail != kring.rtail {
            work = true;
            kring.rtail = kring.hwtail;
        }

        // 5.f conditional guest notification. `work` stays pending across
        // iterations until it is actually delivered (§4.2 step 6 relies on
        // this to flush a still-pending notification on exit).
        if work && ctx.csb.read_guest_need_kick()? {
            ctx.csb.clear_guest_need_kick()?;
            ctx.notifier.inject_irq(ctx.direction);
            trace!(direction = ?ctx.direction, "delivered guest interrupt");
            work = false;
        }

        // 5.g re-snapshot guest indices.
        guest = ctx.csb.read_guest_state()?;

        // 5.h exit condition, direction-specific.
        match ctx.direction {
            SyncDirection::Tx => {
                if guest.head == kring.rhead {
                    // Guest produced nothing new since this iteration's
                    // install. If the backend also hasn't caught up to what
                    // was already handed to it, wait on the backend to
                    // drain rather than on the guest to produce.
                    if kring.hwtail != kring.rhead {
                        break;
                    }
                    if !arm_then_doublecheck(ctx, &mut kring, &mut guest)? {
                        break;
                    }
                }
            }
            SyncDirection::Rx => {
                let ring_full = kring.hwtail == prev(guest.head, kring.num_slots);
                if ring_full {
                    if !arm_then_doublecheck(ctx, &mut kring, &mut guest)? {
                        break;
                    }
                    cycle_nowork = 0;
                    continue;
                }
                if kring.hwtail == kring.rhead {
                    cycle_nowork += 1;
                } else {
                    cycle_nowork = 0;
                }
                if cycle_nowork >= ctx.rx_nowork_cycle_limit {
                    break;
                }
            }
        }

        // 5.i stop/deconfigure check.
        if ctx.stopped.load(Ordering::Relaxed) || !ctx.configured.load(Ordering::Relaxed) {
            break;
        }
    }

    // Step 6: release the kring (guard drop, below) and deliver a final
    // pending interrupt if one is still owed.
    drop(kring);
    if work && ctx.csb.read_guest_need_kick()? {
        ctx.csb.clear_guest_need_kick()?;
        ctx.notifier.inject_irq(ctx.direction);
        trace!(direction = ?ctx.direction, "delivered final pending interrupt on exit");
    }

    Ok(())
}

/// The arm-then-doublecheck handshake shared by the TX "nothing produced"
/// exit and the RX "ring full" exit (§4.2 step 5.h, rationale in §4.2).
///
/// Returns `true` if the guest produced more work during the doublecheck
/// window (host-kick was disarmed again and the caller should keep
/// looping), `false` if the worker should break out and sleep until kicked.
fn arm_then_doublecheck(
    ctx: &WorkerContext,
    kring: &mut std::sync::MutexGuard<'_, crate::kring::KringState>,
    guest: &mut crate::csb::GuestRingState,
) -> Result<bool, WorkerError> {
    thread::sleep(MICROSLEEP);
    ctx.csb.arm_host_kick()?;
    let rechecked = ctx.csb.read_guest_state()?;
    if rechecked.head != kring.rhead {
        ctx.csb.disarm_host_kick()?;
        *guest = rechecked;
        Ok(true)
    } else {
        *guest = rechecked;
        Ok(false)
    }
}
