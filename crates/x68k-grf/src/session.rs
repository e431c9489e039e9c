//! Text-mode session: open, mode application, blanking, close.

use tracing::debug;

use crate::mapper::{FrameBuffer, GrfDevice, GrfInfo};
use crate::modes::{
    console_mode_for_width, CrtMode, TPAL0_TEXT_OPEN, TPAL15_TEXT_OPEN, TVRAM_SIMUL_ACCESS,
};
use crate::regs::{CrtRegs, RegisterBlock};
use crate::saver::ScreenSaver;
use crate::{sequencer, GrfError};

/// Default frame-buffer device node.
pub const GRF_DEVICE: &str = "/dev/grf0";

/// Register values captured at open time and put back verbatim at close,
/// so the console looks exactly as it did before the session.
#[derive(Debug, Clone, Copy)]
struct SavedRegs {
    r21: u16,
    tpal0: u16,
    tpal15: u16,
}

/// An open text-mode session on the frame buffer.
///
/// Opening maps the device, applies the caller's desired mode, enables
/// TVRAM simultaneous access and plants the palette sentinels; closing
/// restores the saved registers, drives the hardware back to a console-safe
/// timing preset and releases the mapping. Exactly one session exists per
/// process (the real device enforces this at open).
#[derive(Debug)]
pub struct TextSession {
    fb: FrameBuffer,
    mode: CrtMode,
    saved: SavedRegs,
    saver: ScreenSaver,
}

impl TextSession {
    /// Opens the default device node with `mode`.
    #[cfg(unix)]
    pub fn open(mode: &CrtMode) -> Result<Self, GrfError> {
        Self::open_at(GRF_DEVICE, mode)
    }

    /// Opens the device node at `path` with `mode`.
    #[cfg(unix)]
    pub fn open_at(path: impl AsRef<std::path::Path>, mode: &CrtMode) -> Result<Self, GrfError> {
        Self::open_device(Box::new(crate::mapper::DevGrf::open(path)?), mode)
    }

    /// Opens a session on an already-constructed device (real or fake).
    ///
    /// On any failure the device is fully released and no session state
    /// remains.
    pub fn open_device(dev: Box<dyn GrfDevice>, mode: &CrtMode) -> Result<Self, GrfError> {
        let fb = FrameBuffer::open_device(dev)?;
        sequencer::apply(fb.regs(), mode);

        let regs = fb.regs();
        let saved = SavedRegs {
            r21: regs.crtc(21),
            tpal0: regs.tpal(0),
            tpal15: regs.tpal(15),
        };

        // Enable TVRAM simultaneous access and reset the text scroll origin.
        regs.set_crtc(21, TVRAM_SIMUL_ACCESS);
        regs.set_crtc(10, 0);
        regs.set_crtc(11, 0);

        // Palette sentinels: black background, near-white entry 15 so the
        // hardware cursor stays visible over the console text plane.
        regs.set_tpal(0, TPAL0_TEXT_OPEN);
        regs.set_tpal(15, TPAL15_TEXT_OPEN);

        debug!(width = fb.display_width(), "text session open");
        Ok(Self {
            fb,
            mode: *mode,
            saved,
            saver: ScreenSaver::new(),
        })
    }

    /// Applies a new desired register set (e.g. switching the session
    /// between its text and graphics timings) and records it as current.
    pub fn apply_mode(&mut self, mode: &CrtMode) {
        sequencer::apply(self.fb.regs(), mode);
        self.mode = *mode;
    }

    /// The mode most recently applied through this session.
    pub fn current_mode(&self) -> &CrtMode {
        &self.mode
    }

    /// Blanks or unblanks the display. Always reports success.
    pub fn save_screen(&mut self, on: bool) -> bool {
        self.saver.set_blank(self.fb.regs(), on)
    }

    /// Whether the display is currently blanked.
    pub fn is_blanked(&self) -> bool {
        self.saver.is_blanked()
    }

    /// The live control-register view.
    pub fn regs(&self) -> &RegisterBlock {
        self.fb.regs()
    }

    /// Start of pixel memory within the mapping.
    pub fn fb_ptr(&self) -> std::ptr::NonNull<u8> {
        self.fb.fb_ptr()
    }

    /// Byte length of pixel memory.
    pub fn fb_len(&self) -> usize {
        self.fb.fb_len()
    }

    /// Geometry reported by the device at open time.
    pub fn info(&self) -> GrfInfo {
        self.fb.info()
    }

    /// Closes the session: restores the saved registers, returns the CRT
    /// controller to the console timing matching the width hint captured at
    /// open, then unmaps and closes the device.
    ///
    /// Never fails from the caller's perspective; an unmap refusal is
    /// logged and the descriptor is closed regardless.
    pub fn close(self) {
        let regs = self.fb.regs();
        regs.set_crtc(21, self.saved.r21);
        regs.set_tpal(0, self.saved.tpal0);
        regs.set_tpal(15, self.saved.tpal15);

        // Whatever mode was active, leave the hardware in a known console
        // timing before the registers disappear from our address space.
        sequencer::apply(regs, console_mode_for_width(self.fb.display_width()));

        debug!("text session closed");
        self.fb.close();
    }
}
