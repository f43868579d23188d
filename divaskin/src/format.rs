//! Binary-format variants and their address spaces.
//!
//! The historical layouts differ only in pointer width and default alignment;
//! everything else in the codec consults [`AddressSpace`] instead of
//! hard-coding sizes.

/// A historical game binary layout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinaryFormat {
    Dt,
    F,
    Ft,
    F2nd,
    X,
}

impl BinaryFormat {
    pub fn address_space(self) -> AddressSpace {
        match self {
            Self::Dt | Self::F | Self::Ft | Self::F2nd => AddressSpace::Bits32,
            Self::X => AddressSpace::Bits64,
        }
    }
}

/// Pointer width plus the default alignment used for scheduled sections.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressSpace {
    Bits32,
    Bits64,
}

impl AddressSpace {
    pub fn pointer_size(self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    pub fn alignment(self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }
}
