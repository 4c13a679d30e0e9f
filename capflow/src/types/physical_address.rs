//! Physical addresses with optional page information.

use super::{umem, Address, PageType};

use std::fmt;

/// An [`Address`] in the physical memory domain together with information about the page that
/// contains it.
///
/// Translating a virtual address yields a `PhysicalAddress` that remembers the size and type of
/// the page the translation went through. A page size of zero means no page information.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct PhysicalAddress {
    pub address: Address,
    pub page_type: PageType,
    page_size_log2: u8,
}

impl PhysicalAddress {
    pub const NULL: PhysicalAddress = PhysicalAddress {
        address: Address::null(),
        page_type: PageType::UNKNOWN,
        page_size_log2: 0,
    };

    pub const INVALID: PhysicalAddress = PhysicalAddress {
        address: Address::INVALID,
        page_type: PageType::UNKNOWN,
        page_size_log2: 0,
    };

    #[inline]
    pub const fn null() -> Self {
        PhysicalAddress::NULL
    }

    #[inline]
    pub const fn invalid() -> Self {
        PhysicalAddress::INVALID
    }

    /// Constructs a physical address that lies in a page of the given type and size.
    ///
    /// The page size must be a power of two.
    #[inline]
    pub fn with_page(address: Address, page_type: PageType, page_size: umem) -> Self {
        Self {
            address,
            page_type,
            page_size_log2: page_size.trailing_zeros() as u8,
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.address.is_null()
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.address.is_valid()
    }

    /// Checks whether the physical address carries page information.
    #[inline]
    pub const fn has_page(&self) -> bool {
        self.page_size_log2 != 0
    }

    #[inline]
    pub const fn address(&self) -> Address {
        self.address
    }

    #[inline]
    pub const fn page_type(&self) -> PageType {
        self.page_type
    }

    /// Size of the containing page, `0` if unknown.
    #[inline]
    pub fn page_size(&self) -> umem {
        if self.has_page() {
            (1 as umem) << self.page_size_log2
        } else {
            0
        }
    }

    /// Base of the containing page, invalid without page information.
    pub fn page_base(&self) -> Address {
        match self.page_size() {
            0 => Address::INVALID,
            size => self.address.as_mem_aligned(size),
        }
    }

    #[inline]
    pub const fn to_umem(self) -> umem {
        self.address.to_umem()
    }
}

impl Default for PhysicalAddress {
    fn default() -> Self {
        Self::NULL
    }
}

impl From<Address> for PhysicalAddress {
    #[inline]
    fn from(address: Address) -> Self {
        Self {
            address,
            page_type: PageType::UNKNOWN,
            page_size_log2: 0,
        }
    }
}

macro_rules! from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PhysicalAddress {
                fn from(value: $ty) -> Self {
                    Self::from(Address::from(value))
                }
            }
        )*
    };
}

from_int!(u32, u64, usize, i32);

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PhysicalAddress")
            .field("address", &format_args!("{:x}", self.address))
            .field("page_type", &self.page_type)
            .field("page_size", &format_args!("{:x}", self.page_size()))
            .finish()
    }
}

impl fmt::UpperHex for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:X}", self.address)
    }
}

impl fmt::LowerHex for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.address)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::super::size;
    use super::*;

    #[test]
    fn test_page_size() {
        let pa = PhysicalAddress::with_page(Address::from(0x1234), PageType::UNKNOWN, 0x1000);
        assert_eq!(pa.page_size(), 0x1000);
        assert_eq!(pa.page_base(), Address::from(0x1000));

        let huge =
            PhysicalAddress::with_page(Address::from(0x23_4567), PageType::UNKNOWN, size::mb(2));
        assert_eq!(huge.page_size(), size::mb(2));
        assert_eq!(huge.page_base(), Address::from(0x20_0000));
    }

    #[test]
    fn test_from_address() {
        let pa = PhysicalAddress::from(0x1000u64);
        assert!(!pa.has_page());
        assert_eq!(pa.page_size(), 0);
        assert_eq!(Address::from(pa), Address::from(0x1000));
    }
}
