/// I/O privilege level of the emulator process (the `IOPL` field of `RFLAGS`).
///
/// ## Overview
/// A process whose IOPL is numerically greater than or equal to its CPL may
/// execute `in`/`out` on any port. User-space code runs at CPL 3, so only
/// [`Iopl::Level3`] grants unrestricted port access; the lower levels leave
/// the per-port `ioperm` bitmap as the only way in.
///
/// | IOPL | Effect for a CPL 3 process |
/// |------|----------------------------|
/// | 0    | only ports granted via `ioperm` |
/// | 1, 2 | same as 0 |
/// | 3    | every port |
///
/// The port server raises itself to [`Iopl::Level3`] before dropping its
/// remaining privileges; the main emulator process stays at [`Iopl::Level0`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
#[repr(u8)]
pub enum Iopl {
    /// No blanket port access.
    #[default]
    Level0 = 0,
    Level1 = 1,
    Level2 = 2,
    /// Unrestricted port access from user mode.
    Level3 = 3,
}

impl Iopl {
    #[inline]
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// `true` if code at CPL 3 may access every port directly.
    #[inline]
    #[must_use]
    pub const fn grants_all_ports(self) -> bool {
        matches!(self, Self::Level3)
    }
}

impl From<Iopl> for u8 {
    #[inline]
    fn from(level: Iopl) -> Self {
        level.to_u8()
    }
}

impl TryFrom<u8> for Iopl {
    type Error = u8;

    #[inline]
    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Level0),
            1 => Ok(Self::Level1),
            2 => Ok(Self::Level2),
            3 => Ok(Self::Level3),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_bits_roundtrip() {
        for b in 0u8..=3 {
            assert_eq!(Iopl::try_from(b).map(u8::from), Ok(b));
        }
        assert_eq!(Iopl::try_from(4), Err(4));
    }

    #[test]
    fn only_level3_opens_every_port() {
        assert!(Iopl::Level3.grants_all_ports());
        assert!(!Iopl::Level2.grants_all_ports());
        assert!(!Iopl::default().grants_all_ports());
    }
}
