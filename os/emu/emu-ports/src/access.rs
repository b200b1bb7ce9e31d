//! # Access Descriptors

/// Width of a single port access.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Width {
    Byte,
    Word,
    Dword,
}

impl Width {
    /// Number of consecutive ports the access spans.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u16 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Dword => 4,
        }
    }

    /// Mask covering the significant bits of a value of this width.
    #[inline]
    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xff,
            Self::Word => 0xffff,
            Self::Dword => 0xffff_ffff,
        }
    }
}

/// Direction of a port access.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    /// The single-character direction/width marker used in port traces.
    ///
    /// ```text
    ///          byte  word  dword
    /// read      >     }     ]
    /// write     <     {     [
    /// ```
    #[must_use]
    pub const fn symbol(self, width: Width) -> char {
        match (self, width) {
            (Self::Read, Width::Byte) => '>',
            (Self::Read, Width::Word) => '}',
            (Self::Read, Width::Dword) => ']',
            (Self::Write, Width::Byte) => '<',
            (Self::Write, Width::Word) => '{',
            (Self::Write, Width::Dword) => '[',
        }
    }
}

/// Direction flag of a `REP` string instruction.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum StringDirection {
    /// DF = 0: the buffer is walked from its first element upwards.
    #[default]
    Forward,
    /// DF = 1: the buffer is walked from its last element downwards.
    Backward,
}
