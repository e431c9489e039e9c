//! Frame-buffer device open, geometry query and mapping.
//!
//! The `grf` driver exposes the control registers and the pixel memory as
//! one contiguous mappable region: registers first, pixel memory directly
//! after. One mmap covers both; the pixel pointer is computed as an offset,
//! never mapped separately.

use std::io;
use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::regs::RegisterBlock;
use crate::GrfError;

/// Result of the geometry/info query issued once per open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrfInfo {
    /// Byte length of the control-register region at the start of the
    /// mapping.
    pub reg_size: usize,
    /// Byte length of the pixel memory following the registers.
    pub fb_size: usize,
    /// Width in pixels of the console display that was active at open time.
    /// Consumed on close to pick the console restore preset.
    pub display_width: u32,
}

/// Low-level frame-buffer device operations.
///
/// [`DevGrf`] is the real device node; tests substitute in-memory fakes to
/// drive full sessions without hardware.
pub trait GrfDevice {
    /// Issues the geometry/info query.
    fn info(&mut self) -> Result<GrfInfo, GrfError>;

    /// Maps `len` bytes of the device (registers + pixel memory) as a
    /// shared read/write region at an address chosen by the system.
    fn map(&mut self, len: usize) -> Result<NonNull<u8>, GrfError>;

    /// Releases a mapping obtained from [`GrfDevice::map`]. Failure is
    /// reported but never treated as fatal by callers.
    fn unmap(&mut self, base: NonNull<u8>, len: usize) -> io::Result<()>;

    /// Closes the underlying descriptor. Runs even when `unmap` failed.
    fn close(&mut self) -> io::Result<()>;
}

#[cfg(unix)]
pub use dev::DevGrf;

#[cfg(unix)]
mod dev {
    use super::*;

    use std::ffi::CString;
    use std::os::raw::{c_int, c_short, c_void};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// One text-mode session per process: the register sequencing and the
    /// saved-register snapshots are only sound with a single writer, and the
    /// original driver relied on its caller to guarantee that. Here the
    /// guarantee is explicit.
    static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

    /// NetBSD `struct grfinfo`, returned by GRFIOCGINFO. Carried in full so
    /// the ioctl parameter length matches the kernel's, even though only
    /// three fields are consumed.
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    #[allow(non_camel_case_types, dead_code)]
    struct grfinfo {
        gd_id: c_int,
        gd_regaddr: *mut c_void,
        gd_regsize: c_int,
        gd_fbaddr: *mut c_void,
        gd_fbsize: c_int,
        gd_colors: c_short,
        gd_planes: c_short,
        gd_fbwidth: c_int,
        gd_fbheight: c_int,
        gd_dwidth: c_int,
        gd_dheight: c_int,
    }

    // BSD ioctl request encoding: direction | parameter length | group | number.
    const IOC_OUT: u32 = 0x4000_0000;
    const IOCPARM_MASK: u32 = 0x1fff;

    const fn ior(group: u8, num: u8, len: usize) -> u32 {
        IOC_OUT | ((len as u32 & IOCPARM_MASK) << 16) | ((group as u32) << 8) | num as u32
    }

    /// GRFIOCGINFO: `_IOR('G', 0, struct grfinfo)`.
    fn grfiocginfo() -> u32 {
        ior(b'G', 0, std::mem::size_of::<grfinfo>())
    }

    /// Narrows the kernel's signed sizes. A negative region size from a
    /// misbehaving driver would otherwise sign-extend into an enormous
    /// mapping length, so it is rejected as a failed query.
    fn info_from_raw(gi: &grfinfo) -> Result<GrfInfo, GrfError> {
        if gi.gd_regsize < 0 || gi.gd_fbsize < 0 || gi.gd_dwidth < 0 {
            return Err(GrfError::DeviceQuery(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "grfinfo reports negative geometry: regsize={} fbsize={} dwidth={}",
                    gi.gd_regsize, gi.gd_fbsize, gi.gd_dwidth
                ),
            )));
        }
        Ok(GrfInfo {
            reg_size: gi.gd_regsize as usize,
            fb_size: gi.gd_fbsize as usize,
            display_width: gi.gd_dwidth as u32,
        })
    }

    /// An open `grf` frame-buffer device node.
    ///
    /// Owns the descriptor and the process-wide session claim; both are
    /// released on drop, so every open-path failure branch releases the
    /// device (the original C driver leaked the descriptor when the info
    /// query or the mapping failed).
    #[derive(Debug)]
    pub struct DevGrf {
        fd: c_int,
        path: PathBuf,
    }

    impl DevGrf {
        /// Opens the device read/write and claims the session lock.
        pub fn open(path: impl AsRef<Path>) -> Result<Self, GrfError> {
            let path = path.as_ref().to_path_buf();
            if SESSION_ACTIVE
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                return Err(GrfError::DeviceOpen {
                    path,
                    source: io::Error::from_raw_os_error(libc::EBUSY),
                });
            }

            let cpath = {
                use std::os::unix::ffi::OsStrExt;
                match CString::new(path.as_os_str().as_bytes()) {
                    Ok(p) => p,
                    Err(_) => {
                        SESSION_ACTIVE.store(false, Ordering::Release);
                        return Err(GrfError::DeviceOpen {
                            path,
                            source: io::Error::new(
                                io::ErrorKind::InvalidInput,
                                "device path contains a nul byte",
                            ),
                        });
                    }
                }
            };

            let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
            if fd < 0 {
                SESSION_ACTIVE.store(false, Ordering::Release);
                return Err(GrfError::DeviceOpen {
                    path,
                    source: io::Error::last_os_error(),
                });
            }
            debug!(path = %path.display(), fd, "opened frame buffer");
            Ok(Self { fd, path })
        }
    }

    impl GrfDevice for DevGrf {
        fn info(&mut self) -> Result<GrfInfo, GrfError> {
            let mut gi: grfinfo = unsafe { std::mem::zeroed() };
            let rc = unsafe { libc::ioctl(self.fd, grfiocginfo() as _, &mut gi as *mut grfinfo) };
            if rc == -1 {
                return Err(GrfError::DeviceQuery(io::Error::last_os_error()));
            }
            info_from_raw(&gi)
        }

        fn map(&mut self, len: usize) -> Result<NonNull<u8>, GrfError> {
            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    self.fd,
                    0,
                )
            };
            if base == libc::MAP_FAILED {
                return Err(GrfError::Mapping(io::Error::last_os_error()));
            }
            // mmap never returns null on success.
            Ok(NonNull::new(base.cast::<u8>()).unwrap())
        }

        fn unmap(&mut self, base: NonNull<u8>, len: usize) -> io::Result<()> {
            let rc = unsafe { libc::munmap(base.as_ptr().cast(), len) };
            if rc == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            if self.fd < 0 {
                return Ok(());
            }
            let rc = unsafe { libc::close(self.fd) };
            self.fd = -1;
            if rc == -1 {
                return Err(io::Error::last_os_error());
            }
            debug!(path = %self.path.display(), "closed frame buffer");
            Ok(())
        }
    }

    impl Drop for DevGrf {
        fn drop(&mut self) {
            if self.fd >= 0 {
                unsafe { libc::close(self.fd) };
                self.fd = -1;
            }
            SESSION_ACTIVE.store(false, Ordering::Release);
        }
    }

}

/// An open, mapped frame-buffer device.
///
/// Owns the device, the single mapping covering registers + pixel memory,
/// and the console width hint captured from the geometry query. The
/// register view and the pixel pointer both borrow the mapping and die with
/// [`FrameBuffer::close`]. Dropping without `close` leaks the mapping until
/// process exit but still closes the descriptor (the device's own drop).
pub struct FrameBuffer {
    dev: Box<dyn GrfDevice>,
    base: NonNull<u8>,
    mapped_len: usize,
    regs: RegisterBlock,
    info: GrfInfo,
}

impl FrameBuffer {
    /// Opens the device node at `path` and maps it.
    #[cfg(unix)]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, GrfError> {
        Self::open_device(Box::new(DevGrf::open(path)?))
    }

    /// Queries geometry and maps `reg_size + fb_size` bytes of `dev` in one
    /// shared read/write mapping. The pixel memory pointer is the register
    /// base plus `reg_size`; there is no second mapping call.
    pub fn open_device(mut dev: Box<dyn GrfDevice>) -> Result<Self, GrfError> {
        let info = dev.info()?;
        let mapped_len = info.reg_size + info.fb_size;
        let base = dev.map(mapped_len)?;

        let regs = match unsafe { RegisterBlock::new(base, info.reg_size) } {
            Ok(regs) => regs,
            Err(err) => {
                if let Err(unmap_err) = dev.unmap(base, mapped_len) {
                    warn!(error = %unmap_err, "can't unmap frame buffer");
                }
                return Err(err);
            }
        };

        debug!(
            reg_size = info.reg_size,
            fb_size = info.fb_size,
            display_width = info.display_width,
            "mapped frame buffer"
        );
        Ok(Self {
            dev,
            base,
            mapped_len,
            regs,
            info,
        })
    }

    /// The control-register view over the start of the mapping.
    pub fn regs(&self) -> &RegisterBlock {
        &self.regs
    }

    /// Start of pixel memory: register base + register region size.
    pub fn fb_ptr(&self) -> NonNull<u8> {
        // In bounds: the mapping is reg_size + fb_size bytes long.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(self.info.reg_size)) }
    }

    /// Byte length of the pixel memory region.
    pub fn fb_len(&self) -> usize {
        self.info.fb_size
    }

    /// Total bytes mapped (registers + pixel memory).
    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    /// Geometry reported by the device at open time.
    pub fn info(&self) -> GrfInfo {
        self.info
    }

    /// Console display width captured at open, used to pick the close-time
    /// restore preset.
    pub fn display_width(&self) -> u32 {
        self.info.display_width
    }

    /// Unmaps the full region and closes the device.
    ///
    /// An unmap failure is logged as a warning and never blocks the
    /// descriptor close; from the caller's perspective this always succeeds.
    pub fn close(mut self) {
        if let Err(err) = self.dev.unmap(self.base, self.mapped_len) {
            warn!(error = %err, "can't unmap frame buffer");
        }
        if let Err(err) = self.dev.close() {
            warn!(error = %err, "can't close frame buffer");
        }
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("base", &self.base)
            .field("mapped_len", &self.mapped_len)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::REG_WINDOW_MIN_LEN;

    use pretty_assertions::assert_eq;

    /// Fake device backed by an in-process buffer.
    struct MemGrf {
        mem: Box<[u16]>,
        info: GrfInfo,
    }

    impl MemGrf {
        fn new(reg_size: usize, fb_size: usize) -> Self {
            Self {
                mem: vec![0u16; (reg_size + fb_size) / 2].into_boxed_slice(),
                info: GrfInfo {
                    reg_size,
                    fb_size,
                    display_width: 768,
                },
            }
        }
    }

    impl GrfDevice for MemGrf {
        fn info(&mut self) -> Result<GrfInfo, GrfError> {
            Ok(self.info)
        }
        fn map(&mut self, len: usize) -> Result<NonNull<u8>, GrfError> {
            assert_eq!(len, self.mem.len() * 2);
            Ok(NonNull::new(self.mem.as_mut_ptr().cast()).unwrap())
        }
        fn unmap(&mut self, _base: NonNull<u8>, _len: usize) -> io::Result<()> {
            Ok(())
        }
        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn maps_registers_and_pixel_memory_contiguously() {
        let reg_size = REG_WINDOW_MIN_LEN;
        let fb_size = 0x8000;
        let fb = FrameBuffer::open_device(Box::new(MemGrf::new(reg_size, fb_size))).unwrap();

        assert_eq!(fb.mapped_len(), reg_size + fb_size);
        assert_eq!(fb.fb_len(), fb_size);
        assert_eq!(fb.regs().len(), reg_size);
        assert_eq!(
            fb.fb_ptr().as_ptr() as usize,
            fb.regs().base().as_ptr() as usize + reg_size,
        );
        fb.close();
    }

    #[test]
    fn query_failure_aborts_the_open() {
        struct NoInfo;
        impl GrfDevice for NoInfo {
            fn info(&mut self) -> Result<GrfInfo, GrfError> {
                Err(GrfError::DeviceQuery(io::Error::from(
                    io::ErrorKind::InvalidInput,
                )))
            }
            fn map(&mut self, _len: usize) -> Result<NonNull<u8>, GrfError> {
                panic!("must not map after a failed query")
            }
            fn unmap(&mut self, _base: NonNull<u8>, _len: usize) -> io::Result<()> {
                Ok(())
            }
            fn close(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let err = FrameBuffer::open_device(Box::new(NoInfo)).unwrap_err();
        assert!(matches!(err, GrfError::DeviceQuery(_)));
    }

    #[test]
    fn undersized_register_region_is_rejected_and_unmapped() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct TinyRegs {
            mem: Box<[u16]>,
            unmapped: Rc<Cell<bool>>,
        }
        impl GrfDevice for TinyRegs {
            fn info(&mut self) -> Result<GrfInfo, GrfError> {
                Ok(GrfInfo {
                    reg_size: 0x100,
                    fb_size: 0x100,
                    display_width: 768,
                })
            }
            fn map(&mut self, _len: usize) -> Result<NonNull<u8>, GrfError> {
                Ok(NonNull::new(self.mem.as_mut_ptr().cast()).unwrap())
            }
            fn unmap(&mut self, _base: NonNull<u8>, _len: usize) -> io::Result<()> {
                self.unmapped.set(true);
                Ok(())
            }
            fn close(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let unmapped = Rc::new(Cell::new(false));
        let dev = TinyRegs {
            mem: vec![0u16; 0x100].into_boxed_slice(),
            unmapped: unmapped.clone(),
        };
        let err = FrameBuffer::open_device(Box::new(dev)).unwrap_err();
        assert!(matches!(err, GrfError::RegionTooSmall { .. }));
        assert!(unmapped.get(), "failed open must release the mapping");
    }
}
