//! # Host Port Access
//!
//! The [`HardwareIo`] trait is the seam between the port subsystem and the
//! host's real I/O port space. [`RealHardware`] performs the accesses with
//! the `in`/`out` instructions and manages access rights through the Linux
//! `ioperm(2)` and `iopl(2)` calls; tests substitute a recording double.
//!
//! ## Privilege Requirements
//! A user-space `in`/`out` only succeeds if the process either runs at
//! [`Iopl::Level3`] or has the port enabled in its `ioperm` bitmap. Otherwise
//! the CPU raises `#GP` and the kernel delivers `SIGSEGV`. The port subsystem
//! tracks both conditions and only calls the access methods once one of
//! them holds.
//!
//! ## Inheritance
//! * The `ioperm` bitmap is **not** inherited across `fork`.
//! * The IOPL **is** inherited and survives dropping root privileges, which
//!   is why the port server uses it.

use crate::privilege::Iopl;
use std::io;

/// Access to the host's I/O port space.
pub trait HardwareIo: Send {
    fn inb(&mut self, port: u16) -> u8;
    fn outb(&mut self, port: u16, value: u8);
    fn inw(&mut self, port: u16) -> u16;
    fn outw(&mut self, port: u16, value: u16);
    fn inl(&mut self, port: u16) -> u32;
    fn outl(&mut self, port: u16, value: u32);

    /// Grants or revokes direct access to `len` ports starting at `start`.
    ///
    /// # Errors
    /// The OS error if the grant was refused.
    fn ioperm(&mut self, start: u16, len: usize, enable: bool) -> io::Result<()>;

    /// Changes the I/O privilege level of the calling process.
    ///
    /// # Errors
    /// The OS error if the change was refused.
    fn iopl(&mut self, level: Iopl) -> io::Result<()>;

    /// Permanently gives up elevated user and group ids.
    ///
    /// # Errors
    /// The OS error if the ids could not be reset.
    fn drop_privileges(&mut self) -> io::Result<()>;
}

/// The host's real port space.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealHardware;

impl RealHardware {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
mod imp {
    use super::{Iopl, io};

    // SAFETY (all accessors): the port subsystem only calls these after
    // IOPL 3 or an `ioperm` grant covering the port was established.
    #[inline]
    pub fn inb(port: u16) -> u8 {
        let v: u8;
        unsafe {
            core::arch::asm!("in al, dx", in("dx") port, out("al") v, options(nomem, nostack, preserves_flags));
        }
        v
    }

    #[inline]
    pub fn outb(port: u16, val: u8) {
        unsafe {
            core::arch::asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags));
        }
    }

    #[inline]
    pub fn inw(port: u16) -> u16 {
        let v: u16;
        unsafe {
            core::arch::asm!("in ax, dx", in("dx") port, out("ax") v, options(nomem, nostack, preserves_flags));
        }
        v
    }

    #[inline]
    pub fn outw(port: u16, val: u16) {
        unsafe {
            core::arch::asm!("out dx, ax", in("dx") port, in("ax") val, options(nomem, nostack, preserves_flags));
        }
    }

    #[inline]
    pub fn inl(port: u16) -> u32 {
        let v: u32;
        unsafe {
            core::arch::asm!("in eax, dx", in("dx") port, out("eax") v, options(nomem, nostack, preserves_flags));
        }
        v
    }

    #[inline]
    pub fn outl(port: u16, val: u32) {
        unsafe {
            core::arch::asm!("out dx, eax", in("dx") port, in("eax") val, options(nomem, nostack, preserves_flags));
        }
    }

    fn check(rc: libc::c_int) -> io::Result<()> {
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub fn ioperm(start: u16, len: usize, enable: bool) -> io::Result<()> {
        let len = libc::c_ulong::try_from(len).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        check(unsafe { libc::ioperm(libc::c_ulong::from(start), len, libc::c_int::from(enable)) })
    }

    pub fn iopl(level: Iopl) -> io::Result<()> {
        check(unsafe { libc::iopl(libc::c_int::from(level.to_u8())) })
    }

    pub fn drop_privileges() -> io::Result<()> {
        // Group first: once the uid is dropped the gid can no longer change.
        unsafe {
            let gid = libc::getgid();
            check(libc::setresgid(gid, gid, gid))?;
            let uid = libc::getuid();
            check(libc::setresuid(uid, uid, uid))
        }
    }
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64"))))]
mod imp {
    use super::{Iopl, io};

    pub const fn inb(_port: u16) -> u8 {
        0xff
    }

    pub const fn outb(_port: u16, _val: u8) {}

    pub const fn inw(_port: u16) -> u16 {
        0xffff
    }

    pub const fn outw(_port: u16, _val: u16) {}

    pub const fn inl(_port: u16) -> u32 {
        0xffff_ffff
    }

    pub const fn outl(_port: u16, _val: u32) {}

    pub fn ioperm(_start: u16, _len: usize, _enable: bool) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub fn iopl(_level: Iopl) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub fn drop_privileges() -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

impl HardwareIo for RealHardware {
    #[inline]
    fn inb(&mut self, port: u16) -> u8 {
        imp::inb(port)
    }

    #[inline]
    fn outb(&mut self, port: u16, value: u8) {
        imp::outb(port, value);
    }

    #[inline]
    fn inw(&mut self, port: u16) -> u16 {
        imp::inw(port)
    }

    #[inline]
    fn outw(&mut self, port: u16, value: u16) {
        imp::outw(port, value);
    }

    #[inline]
    fn inl(&mut self, port: u16) -> u32 {
        imp::inl(port)
    }

    #[inline]
    fn outl(&mut self, port: u16, value: u32) {
        imp::outl(port, value);
    }

    fn ioperm(&mut self, start: u16, len: usize, enable: bool) -> io::Result<()> {
        imp::ioperm(start, len, enable)
    }

    fn iopl(&mut self, level: Iopl) -> io::Result<()> {
        imp::iopl(level)
    }

    fn drop_privileges(&mut self) -> io::Result<()> {
        imp::drop_privileges()
    }
}
