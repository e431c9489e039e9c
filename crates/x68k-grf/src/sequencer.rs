//! Ordered application of a video-mode preset to the CRT controller.
//!
//! The timing registers cannot be written as an atomic group, and the R20
//! selector gates the controller's internal clock dividers. During a
//! transition the selector must match the *smaller* of the two bandwidth
//! requirements at every instant; otherwise the controller momentarily
//! drives one mode's geometry at the other mode's clock, which desyncs the
//! analog output and can damage sync timing on a fixed-frequency monitor.
//! Hence the single most safety-critical rule in this driver: when raising
//! bandwidth, geometry first and selector last; when lowering (or staying),
//! selector first and geometry after.

use tracing::trace;

use crate::modes::{CrtMode, SYSPORT_DOTCLOCK_HIGH, SYSPORT_DOTCLOCK_LOW};
use crate::regs::{r20_bandwidth_key, CrtRegs};

/// Writes `mode` into the live register file in hazard-free order.
///
/// Infallible: memory-mapped register writes have no failure signal, so
/// this is a best-effort hardware operation with nothing to report.
/// Re-applying the currently active mode is safe; the direction decision
/// always compares against the live R20 value, never a cached one, and the
/// equal-bandwidth case takes the conservative selector-first order.
pub fn apply<R: CrtRegs + ?Sized>(regs: &R, mode: &CrtMode) {
    let current = regs.crtc(20);
    let raising = r20_bandwidth_key(mode.selector()) > r20_bandwidth_key(current);
    trace!(current, target = mode.selector(), raising, "applying CRT mode");

    if raising {
        // Entering a higher-bandwidth mode: hold the old (slower) selector
        // while the geometry registers change, then switch clocks last.
        for reg in 0..=7 {
            regs.set_crtc(reg, mode.crtc[reg]);
        }
        regs.set_crtc(20, mode.crtc[20]);
    } else {
        // Entering an equal- or lower-bandwidth mode: drop the clock first,
        // then rewrite the geometry; the horizontal total goes last.
        regs.set_crtc(20, mode.crtc[20]);
        for reg in 1..=7 {
            regs.set_crtc(reg, mode.crtc[reg]);
        }
        regs.set_crtc(0, mode.crtc[0]);
    }
    regs.set_crtc(8, mode.crtc[8]);

    // Scroll registers never participate in the ordering hazard.
    for reg in 12..=19 {
        regs.set_crtc(reg, mode.crtc[reg]);
    }

    // Video controller: screen mode, priority, output enable.
    for reg in 0..3 {
        regs.set_videoc(reg, mode.videoc[reg]);
    }

    regs.set_sysport_r4(if mode.dot_clock {
        SYSPORT_DOTCLOCK_HIGH
    } else {
        SYSPORT_DOTCLOCK_LOW
    });
}
