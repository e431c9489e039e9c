//! Screen blanking with exact register restore.

use crate::regs::CrtRegs;

/// Video controller R2 gates the output planes; writing zero disables the
/// image entirely while leaving every other register untouched, which is
/// what makes blanking instantly reversible.
const VIDEOC_OUTPUT_ENABLE: usize = 2;

/// Screen-saver state for one display: whether the output is currently
/// blanked, and the R2 value to put back when it is not.
///
/// Both transitions are idempotent. A second blank request keeps the value
/// saved by the first one, so an unblank always restores the register the
/// screen had before the saver kicked in.
#[derive(Debug, Default)]
pub struct ScreenSaver {
    blanked: bool,
    saved_r2: u16,
}

impl ScreenSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blanks (`on == true`) or unblanks the display.
    ///
    /// Always reports success: toggling the output-enable register cannot
    /// fail. The `bool` return mirrors the screen-saver hook contract of the
    /// surrounding server.
    pub fn set_blank<R: CrtRegs + ?Sized>(&mut self, regs: &R, on: bool) -> bool {
        if on {
            if !self.blanked {
                self.saved_r2 = regs.videoc(VIDEOC_OUTPUT_ENABLE);
                regs.set_videoc(VIDEOC_OUTPUT_ENABLE, 0x0000);
                self.blanked = true;
            }
        } else if self.blanked {
            regs.set_videoc(VIDEOC_OUTPUT_ENABLE, self.saved_r2);
            self.blanked = false;
        }
        true
    }

    /// Whether the display is currently blanked by this saver.
    pub fn is_blanked(&self) -> bool {
        self.blanked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use pretty_assertions::assert_eq;

    /// Minimal register file: only the video controller is live.
    #[derive(Default)]
    struct VideocOnly {
        r2: Cell<u16>,
    }

    impl CrtRegs for VideocOnly {
        fn crtc(&self, _reg: usize) -> u16 {
            0
        }
        fn set_crtc(&self, _reg: usize, _value: u16) {}
        fn videoc(&self, reg: usize) -> u16 {
            assert_eq!(reg, 2);
            self.r2.get()
        }
        fn set_videoc(&self, reg: usize, value: u16) {
            assert_eq!(reg, 2);
            self.r2.set(value);
        }
        fn sysport_r4(&self) -> u16 {
            0
        }
        fn set_sysport_r4(&self, _value: u16) {}
    }

    #[test]
    fn blank_then_unblank_restores_the_exact_value() {
        let regs = VideocOnly::default();
        regs.r2.set(0x002F);
        let mut saver = ScreenSaver::new();

        assert!(saver.set_blank(&regs, true));
        assert_eq!(regs.r2.get(), 0x0000);
        assert!(saver.is_blanked());

        assert!(saver.set_blank(&regs, false));
        assert_eq!(regs.r2.get(), 0x002F);
        assert!(!saver.is_blanked());
    }

    #[test]
    fn second_blank_keeps_the_first_saved_value() {
        let regs = VideocOnly::default();
        regs.r2.set(0x0020);
        let mut saver = ScreenSaver::new();

        saver.set_blank(&regs, true);
        // Someone pokes R2 while blanked; a repeated blank request must not
        // capture the poked value.
        regs.r2.set(0xBEEF);
        saver.set_blank(&regs, true);

        saver.set_blank(&regs, false);
        assert_eq!(regs.r2.get(), 0x0020);
    }

    #[test]
    fn unblank_while_not_blanked_is_a_no_op() {
        let regs = VideocOnly::default();
        regs.r2.set(0x0020);
        let mut saver = ScreenSaver::new();

        saver.set_blank(&regs, false);
        assert_eq!(regs.r2.get(), 0x0020);
        assert!(!saver.is_blanked());
    }
}
