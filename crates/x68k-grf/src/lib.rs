//! Mode-switch driver for the Sharp X68000 CRT controller.
//!
//! This crate is intentionally self-contained so it can be wired into a
//! display server later. It owns the hardware-facing half of text-mode
//! bring-up on the X68000's `grf` frame-buffer device:
//! - Opening `/dev/grf0`, querying its geometry and mapping the CRT
//!   controller registers plus pixel memory into the process ([`FrameBuffer`]).
//! - Glitch-free sequencing of CRT timing register writes when switching
//!   between video modes ([`sequencer::apply`]). Timing registers cannot be
//!   written as an atomic group, and the resolution selector must match the
//!   *smaller* of the two bandwidth requirements at every instant during a
//!   transition, so write order depends on the direction of the switch.
//! - A text-mode session ([`TextSession`]) that enables TVRAM simultaneous
//!   access, plants the palette sentinels the hardware cursor needs, and on
//!   close restores the console to a known-safe timing preset.
//! - Screen blanking with exact register restore ([`saver::ScreenSaver`]).
//!
//! All register accesses go through [`RegisterBlock`], a volatile,
//! offset-exact view of the mapped control-register window; nothing is
//! buffered or cached. Register writes have no failure signal (memory-mapped
//! I/O provides none), so mode application is infallible by design and the
//! open path is the only place errors can surface.
//!
//! The driver assumes a single active session per process. Opening the real
//! device claims a process-wide session lock; a second simultaneous open
//! fails with `EBUSY`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod mapper;
pub mod modes;
pub mod regs;
pub mod saver;
pub mod sequencer;
pub mod session;

#[cfg(unix)]
pub use mapper::DevGrf;
pub use mapper::{FrameBuffer, GrfDevice, GrfInfo};
pub use modes::{console_mode_for_width, CrtMode, CONSOLE_640X480, CONSOLE_768X512};
pub use regs::{CrtRegs, RegisterBlock};
pub use saver::ScreenSaver;
pub use session::{TextSession, GRF_DEVICE};

/// Errors surfaced while opening and mapping the frame-buffer device.
///
/// Every variant is terminal for that open attempt: no session is created and
/// the device descriptor is released before the error is returned. Close-path
/// unmap failure is deliberately *not* represented here; it is logged as a
/// warning and does not block the descriptor close.
#[derive(Debug, Error)]
pub enum GrfError {
    /// The frame-buffer device node could not be opened read/write.
    #[error("can't open frame buffer {path}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The GRFIOCGINFO geometry query was rejected by the driver.
    #[error("can't get grfinfo: {0}")]
    DeviceQuery(#[source] io::Error),

    /// The kernel refused the shared read/write mapping of the device.
    #[error("can't map frame buffer: {0}")]
    Mapping(#[source] io::Error),

    /// The control-register region reported by the geometry query is smaller
    /// than the documented register layout, so a register view over it would
    /// touch memory past the mapping.
    #[error("register window too small: {len:#x} bytes, need at least {min:#x}")]
    RegionTooSmall { len: usize, min: usize },
}
