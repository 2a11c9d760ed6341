use std::fmt;

const BE_BIT: u64 = 1 << 0;
const PAGE_SIZE_SHIFT: u64 = 1;
const PAGE_SIZE_MASK: u64 = 0b11 << PAGE_SIZE_SHIFT;
const PHYS_PLACEMENT_BIT: u64 = 1 << 3;
const KNOWN_BITS: u64 = BE_BIT | PAGE_SIZE_MASK | PHYS_PLACEMENT_BIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSize {
    Unspecified,
    Size4K,
    Size16K,
    Size64K,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// 2MB aligned base should be as close as possible to the base of DRAM.
    NearDramBase,
    /// 2MB aligned base may be anywhere in physical memory.
    Anywhere,
}

/// Decoded view of [`ImageHeader::flags`](crate::ImageHeader::flags).
///
/// Bit 0 is the kernel endianness, bits 1-2 the page size, bit 3 the physical
/// placement. Everything above is reserved and kept verbatim in `reserved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFlags {
    pub endianness: Endianness,
    pub page_size: PageSize,
    pub placement: Placement,
    pub reserved: u64,
}

impl From<u64> for HeaderFlags {
    fn from(raw: u64) -> Self {
        let endianness = if raw & BE_BIT != 0 {
            Endianness::Big
        } else {
            Endianness::Little
        };
        let page_size = match (raw & PAGE_SIZE_MASK) >> PAGE_SIZE_SHIFT {
            1 => PageSize::Size4K,
            2 => PageSize::Size16K,
            3 => PageSize::Size64K,
            _ => PageSize::Unspecified,
        };
        let placement = if raw & PHYS_PLACEMENT_BIT != 0 {
            Placement::Anywhere
        } else {
            Placement::NearDramBase
        };

        HeaderFlags {
            endianness,
            page_size,
            placement,
            reserved: raw & !KNOWN_BITS,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => write!(f, "little-endian"),
            Endianness::Big => write!(f, "big-endian"),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::Unspecified => write!(f, "unspecified"),
            PageSize::Size4K => write!(f, "4K"),
            PageSize::Size16K => write!(f, "16K"),
            PageSize::Size64K => write!(f, "64K"),
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::NearDramBase => write!(f, "near DRAM base"),
            Placement::Anywhere => write!(f, "anywhere"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_flags_decode_to_defaults() {
        let flags = HeaderFlags::from(0);
        assert_eq!(flags.endianness, Endianness::Little);
        assert_eq!(flags.page_size, PageSize::Unspecified);
        assert_eq!(flags.placement, Placement::NearDramBase);
        assert_eq!(flags.reserved, 0);
    }

    #[test]
    fn every_known_bit_decodes() {
        let flags = HeaderFlags::from(0b1111);
        assert_eq!(flags.endianness, Endianness::Big);
        assert_eq!(flags.page_size, PageSize::Size64K);
        assert_eq!(flags.placement, Placement::Anywhere);
        assert_eq!(flags.reserved, 0);
    }

    #[test]
    fn page_size_field() {
        assert_eq!(HeaderFlags::from(0b010).page_size, PageSize::Size4K);
        assert_eq!(HeaderFlags::from(0b100).page_size, PageSize::Size16K);
    }

    #[test]
    fn reserved_bits_are_kept() {
        let flags = HeaderFlags::from((1 << 40) | 0b0010);
        assert_eq!(flags.reserved, 1 << 40);
        assert_eq!(flags.page_size, PageSize::Size4K);
    }
}
