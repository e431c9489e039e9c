//! Video-mode presets and the hardware constants a text session plants.

/// A complete desired register set for one video mode.
///
/// `crtc` carries CRTC R00..R20 as values (R21..R23 are session state, not
/// mode state, and are never part of a preset). `videoc` carries video
/// controller R0..R2. `dot_clock` selects the higher of the two pixel
/// clocks via system port R4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrtMode {
    pub crtc: [u16; 21],
    pub videoc: [u16; 3],
    pub dot_clock: bool,
}

impl CrtMode {
    /// The R20 mode/resolution selector of this preset.
    pub fn selector(&self) -> u16 {
        self.crtc[20]
    }
}

/// CRT mode 16: 768x512 at 31.5kHz, the stock console timing.
pub const CONSOLE_768X512: CrtMode = CrtMode {
    crtc: [
        137, 14, 28, 124, //
        567, 5, 40, 552, //
        27, 0, 0, 0, //
        0, 0, 0, 0, //
        0, 0, 0, 0, //
        0x0416,
    ],
    videoc: [0x0004, 0x21E4, 0x0020],
    dot_clock: false,
};

/// CRT mode 19: 640x480 at 31.5kHz (VGA-class console timing).
pub const CONSOLE_640X480: CrtMode = CrtMode {
    crtc: [
        99, 11, 13, 93, //
        524, 1, 33, 513, //
        27, 0, 0, 0, //
        0, 0, 0, 0, //
        0, 0, 0, 0, //
        0x0417,
    ],
    videoc: [0x0004, 0x21E4, 0x0020],
    dot_clock: false,
};

/// Picks the console restore preset from the displayed-width hint reported
/// by the geometry query: a 640-wide console gets the VGA-class timing,
/// everything else the stock 768x512 timing.
pub fn console_mode_for_width(width: u32) -> &'static CrtMode {
    if width == 640 {
        &CONSOLE_640X480
    } else {
        &CONSOLE_768X512
    }
}

/// CRTC R21 value enabling TVRAM simultaneous access, so the text and
/// graphics planes can be reached without exclusive bus arbitration.
pub const TVRAM_SIMUL_ACCESS: u16 = 0x01F0;

/// Text palette entry 0 planted at session open: black console background.
pub const TPAL0_TEXT_OPEN: u16 = 0x0000;
/// Text palette entry 15 planted at session open: near-white, so the
/// hardware cursor/overlay stays visible against the console text plane.
pub const TPAL15_TEXT_OPEN: u16 = 0xFFFE;

/// System port R4 value selecting the higher dot clock.
pub const SYSPORT_DOTCLOCK_HIGH: u16 = 0x000E;
/// System port R4 value selecting the lower dot clock.
pub const SYSPORT_DOTCLOCK_LOW: u16 = 0x000C;
