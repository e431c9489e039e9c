//! Volatile, offset-exact view of the mapped control-register window.
//!
//! The `grf` device maps the CRT controller, video controller, system port
//! and palettes as one contiguous register region (physical `0xE8_0000` on
//! hardware). All offsets below are relative to the start of that window.
//! Every register is a 16-bit word; every access is issued as a single
//! volatile read or write so the compiler can neither elide, merge nor
//! reorder individual register accesses.

use std::ptr::NonNull;

use crate::GrfError;

/// CRTC R00..R23 live at the start of the window, one `u16` each.
///
/// R00..R07 are the geometry timing registers (horizontal/vertical total,
/// sync and display-enable counts), R08 the external-sync adjust, R09 the
/// raster interrupt line, R10/R11 text scroll X/Y, R12..R19 graphic scroll,
/// R20 the memory/resolution mode selector, R21 TVRAM access control,
/// R22 raster copy and R23 the text mask.
pub const CRTC_BASE: usize = 0x0000;
/// Number of CRTC registers exposed by the window view.
pub const CRTC_REG_COUNT: usize = 24;

/// Text palette: 256 `u16` entries. This driver only touches entries 0
/// and 15, but the whole table is addressable.
pub const TPAL_BASE: usize = 0x2200;
pub const TPAL_LEN: usize = 256;

/// Video controller R0 (screen mode), R1 (priority), R2 (output enable),
/// one register per 256-byte page.
pub const VIDEOC_BASE: usize = 0x2400;
pub const VIDEOC_REG_COUNT: usize = 3;

/// System port R4 (misc board control; bit 1 selects the dot clock).
pub const SYSPORT_R4: usize = 0xE006;

/// Smallest control-register window a [`RegisterBlock`] can be built over.
pub const REG_WINDOW_MIN_LEN: usize = SYSPORT_R4 + 2;

/// CRTC R20 horizontal-frequency class field (2 bits).
pub const R20_HFREQ_MASK: u16 = 0x0003;
/// CRTC R20 scan-mode (vertical resolution) bit.
pub const R20_SCAN_MASK: u16 = 0x0010;

/// Ordering key for the R20 selector fields: frequency class first, scan
/// mode second. A strictly greater key means a strictly higher bandwidth
/// requirement, which is what decides the timing-register write order in
/// [`crate::sequencer::apply`].
pub fn r20_bandwidth_key(r20: u16) -> (u16, u16) {
    (r20 & R20_HFREQ_MASK, r20 & R20_SCAN_MASK)
}

/// Register file surface the mode sequencer and screen saver write through.
///
/// [`RegisterBlock`] is the hardware implementation; tests substitute
/// recording implementations to observe write order.
pub trait CrtRegs {
    /// Read CRTC register `reg` (0..[`CRTC_REG_COUNT`]).
    fn crtc(&self, reg: usize) -> u16;
    /// Write CRTC register `reg`.
    fn set_crtc(&self, reg: usize, value: u16);
    /// Read video controller register `reg` (0..[`VIDEOC_REG_COUNT`]).
    fn videoc(&self, reg: usize) -> u16;
    /// Write video controller register `reg`.
    fn set_videoc(&self, reg: usize, value: u16);
    /// Read system port R4.
    fn sysport_r4(&self) -> u16;
    /// Write system port R4.
    fn set_sysport_r4(&self, value: u16);
}

/// Non-owning view of the mapped control-register window.
///
/// This is a direct window onto physical hardware: writes take effect
/// immediately and reads observe live controller state. The block does not
/// own the mapping; [`crate::FrameBuffer`] does, and keeps the view alive
/// only as long as the mapping is.
///
/// Not `Send`/`Sync`: register sequencing assumes exactly one writer.
#[derive(Debug)]
pub struct RegisterBlock {
    base: NonNull<u8>,
    len: usize,
}

impl RegisterBlock {
    /// Builds a register view over `len` bytes at `base`.
    ///
    /// Fails with [`GrfError::RegionTooSmall`] if the window cannot hold the
    /// documented layout (see [`REG_WINDOW_MIN_LEN`]).
    ///
    /// # Safety
    ///
    /// `base` must point to at least `len` bytes of 2-byte-aligned memory
    /// that stays valid (and is not written through other Rust references)
    /// for the lifetime of the returned block.
    pub unsafe fn new(base: NonNull<u8>, len: usize) -> Result<Self, GrfError> {
        debug_assert_eq!(base.as_ptr() as usize % 2, 0, "register window misaligned");
        if len < REG_WINDOW_MIN_LEN {
            return Err(GrfError::RegionTooSmall {
                len,
                min: REG_WINDOW_MIN_LEN,
            });
        }
        Ok(Self { base, len })
    }

    /// Base address of the window this view covers.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Length in bytes of the window this view covers. Always at least
    /// [`REG_WINDOW_MIN_LEN`]; construction rejects anything shorter.
    pub fn len(&self) -> usize {
        self.len
    }

    fn word(&self, offset: usize) -> *mut u16 {
        debug_assert!(offset + 2 <= self.len && offset % 2 == 0);
        // Offset is within the window (all callers pass layout constants
        // checked against `len` at construction).
        unsafe { self.base.as_ptr().add(offset).cast::<u16>() }
    }

    fn read(&self, offset: usize) -> u16 {
        unsafe { self.word(offset).read_volatile() }
    }

    fn write(&self, offset: usize, value: u16) {
        unsafe { self.word(offset).write_volatile(value) }
    }

    /// Read text palette entry `index`.
    pub fn tpal(&self, index: usize) -> u16 {
        assert!(index < TPAL_LEN);
        self.read(TPAL_BASE + 2 * index)
    }

    /// Write text palette entry `index`.
    pub fn set_tpal(&self, index: usize, value: u16) {
        assert!(index < TPAL_LEN);
        self.write(TPAL_BASE + 2 * index, value)
    }
}

impl CrtRegs for RegisterBlock {
    fn crtc(&self, reg: usize) -> u16 {
        assert!(reg < CRTC_REG_COUNT);
        self.read(CRTC_BASE + 2 * reg)
    }

    fn set_crtc(&self, reg: usize, value: u16) {
        assert!(reg < CRTC_REG_COUNT);
        self.write(CRTC_BASE + 2 * reg, value)
    }

    fn videoc(&self, reg: usize) -> u16 {
        assert!(reg < VIDEOC_REG_COUNT);
        self.read(VIDEOC_BASE + 0x100 * reg)
    }

    fn set_videoc(&self, reg: usize, value: u16) {
        assert!(reg < VIDEOC_REG_COUNT);
        self.write(VIDEOC_BASE + 0x100 * reg, value)
    }

    fn sysport_r4(&self) -> u16 {
        self.read(SYSPORT_R4)
    }

    fn set_sysport_r4(&self, value: u16) {
        self.write(SYSPORT_R4, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // u16-backed so the window is 2-byte aligned like the real mapping.
    fn window() -> Vec<u16> {
        vec![0u16; REG_WINDOW_MIN_LEN / 2]
    }

    fn block(buf: &mut [u16]) -> RegisterBlock {
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        unsafe { RegisterBlock::new(base, buf.len() * 2) }.unwrap()
    }

    #[test]
    fn rejects_window_shorter_than_layout() {
        let mut buf = window();
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        let err = unsafe { RegisterBlock::new(base, REG_WINDOW_MIN_LEN - 2) }.unwrap_err();
        assert!(matches!(err, GrfError::RegionTooSmall { .. }));
    }

    #[test]
    fn accessors_hit_documented_offsets() {
        let mut buf = window();
        let regs = block(&mut buf);

        regs.set_crtc(20, 0x0416);
        regs.set_crtc(21, 0x01F0);
        regs.set_tpal(15, 0xFFFE);
        regs.set_videoc(0, 0x0004);
        regs.set_videoc(1, 0x21E4);
        regs.set_videoc(2, 0x0020);
        regs.set_sysport_r4(0x000C);

        assert_eq!(buf[(CRTC_BASE + 2 * 20) / 2], 0x0416);
        assert_eq!(buf[(CRTC_BASE + 2 * 21) / 2], 0x01F0);
        assert_eq!(buf[(TPAL_BASE + 2 * 15) / 2], 0xFFFE);
        assert_eq!(buf[VIDEOC_BASE / 2], 0x0004);
        assert_eq!(buf[(VIDEOC_BASE + 0x100) / 2], 0x21E4);
        assert_eq!(buf[(VIDEOC_BASE + 0x200) / 2], 0x0020);
        assert_eq!(buf[SYSPORT_R4 / 2], 0x000C);
    }

    #[test]
    fn reads_observe_backing_memory() {
        let mut buf = window();
        buf[(CRTC_BASE + 2 * 20) / 2] = 0x0417;
        buf[(VIDEOC_BASE + 0x200) / 2] = 0x002F;
        let regs = block(&mut buf);

        assert_eq!(regs.crtc(20), 0x0417);
        assert_eq!(regs.videoc(2), 0x002F);
    }

    #[test]
    fn bandwidth_key_orders_class_before_scan_mode() {
        // Frequency class dominates.
        assert!(r20_bandwidth_key(0x0002) > r20_bandwidth_key(0x0011));
        // Equal class: scan-mode bit breaks the tie.
        assert!(r20_bandwidth_key(0x0011) > r20_bandwidth_key(0x0001));
        // Other R20 bits do not participate.
        assert_eq!(r20_bandwidth_key(0x0416), r20_bandwidth_key(0x0016));
    }
}
