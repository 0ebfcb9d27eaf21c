use crate::csb::CsbRingView;

/// Drives the guest side of a `csb_ring`: produces/consumes slots and
/// arms/disarms its own interrupt flag, exactly like a real guest driver
/// would, but synchronously and from the test thread.
pub struct SyntheticGuest {
    ring: CsbRingView,
}

impl SyntheticGuest {
    pub fn new(ring: CsbRingView) -> Self {
        Self { ring }
    }

    /// Advances `head`/`cur` to `new_head`, as a TX guest producing slots or
    /// an RX guest freeing slots back to the host.
    pub fn advance_head(&self, new_head: u32) {
        self.ring.write_head(new_head).expect("guest write head");
        self.ring.write_cur(new_head).expect("guest write cur");
    }

    pub fn arm_interrupt(&self) {
        self.ring
            .write_guest_need_kick(true)
            .expect("guest arm interrupt");
    }

    pub fn disarm_interrupt(&self) {
        self.ring
            .write_guest_need_kick(false)
            .expect("guest disarm interrupt");
    }

    pub fn host_need_kick(&self) -> bool {
        self.ring.read_host_need_kick().expect("read host_need_kick")
    }

    pub fn hwcur(&self) -> u32 {
        self.ring.read_hwcur().expect("read hwcur")
    }

    pub fn hwtail(&self) -> u32 {
        self.ring.read_hwtail().expect("read hwtail")
    }
}
