//! Addresses on the target system.

use super::PhysicalAddress;

use std::fmt;
use std::ops;

/// The largest target memory type.
///
/// `usize` can always be cast to `umem` without loss.
#[allow(non_camel_case_types)]
pub type umem = u64;
#[allow(non_camel_case_types)]
pub type imem = i64;

pub const UMEM_BITS: u8 = std::mem::size_of::<umem>() as u8 * 8;

const _: [u8; (std::mem::size_of::<usize>() <= std::mem::size_of::<umem>()) as usize] = [0; 1];

/// Clamps a `umem` into the host `usize` range.
pub const fn clamp_to_usize(val: umem) -> usize {
    let max = usize::MAX as umem;
    let ret = if max < val { max } else { val };
    ret as usize
}

/// Address on the target system.
///
/// Wraps a `umem`, arithmetic wraps around instead of checking for overflow.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct Address(umem);

impl Address {
    /// An address with the value of zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use capflow::types::Address;
    ///
    /// assert!(Address::NULL.is_null());
    /// ```
    pub const NULL: Address = Address(0);

    /// An address with an invalid value.
    pub const INVALID: Address = Address(!0);

    #[inline]
    pub const fn null() -> Self {
        Address::NULL
    }

    #[inline]
    pub const fn invalid() -> Self {
        Address::INVALID
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns `None` for a null address.
    #[inline]
    pub fn non_null(self) -> Option<Address> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != !0
    }

    #[inline]
    pub const fn to_umem(self) -> umem {
        self.0
    }

    /// Aligns the address down to `mem_size`, which has to be a power of two.
    ///
    /// # Examples
    ///
    /// ```
    /// use capflow::types::{size, Address};
    ///
    /// let addr = Address::from(0x1234u64);
    /// assert_eq!(addr.as_mem_aligned(size::kb(4)), Address::from(0x1000u64));
    /// ```
    #[inline]
    pub const fn as_mem_aligned(self, mem_size: umem) -> Self {
        Self(self.0 & !(mem_size - 1))
    }

    #[inline]
    pub const fn wrapping_add(self, other: Self) -> Self {
        Self(self.0.wrapping_add(other.0))
    }

    #[inline]
    pub const fn wrapping_sub(self, other: Self) -> Self {
        Self(self.0.wrapping_sub(other.0))
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::NULL
    }
}

// Offsets wrap around, the same as pointer arithmetic on the target would.
macro_rules! offsets {
    (unsigned: $($ty:ty),*) => {
        $(
            impl From<$ty> for Address {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self(value as umem)
                }
            }

            offsets!(@ops $ty);
        )*
    };
    (signed: $($ty:ty),*) => {
        $(
            impl From<$ty> for Address {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self(value as imem as umem)
                }
            }

            offsets!(@ops $ty);
        )*
    };
    (@ops $ty:ty) => {
        impl ops::Add<$ty> for Address {
            type Output = Address;

            #[inline]
            fn add(self, offset: $ty) -> Address {
                Self(self.0.wrapping_add(Address::from(offset).0))
            }
        }

        impl ops::Sub<$ty> for Address {
            type Output = Address;

            #[inline]
            fn sub(self, offset: $ty) -> Address {
                Self(self.0.wrapping_sub(Address::from(offset).0))
            }
        }

        impl ops::AddAssign<$ty> for Address {
            #[inline]
            fn add_assign(&mut self, offset: $ty) {
                *self = *self + offset
            }
        }

        impl ops::SubAssign<$ty> for Address {
            #[inline]
            fn sub_assign(&mut self, offset: $ty) {
                *self = *self - offset
            }
        }
    };
}

offsets!(unsigned: u8, u16, u32, u64, usize);
offsets!(signed: i32, i64);

impl From<PhysicalAddress> for Address {
    #[inline]
    fn from(address: PhysicalAddress) -> Self {
        address.address
    }
}

/// Signed distance between two addresses.
///
/// # Examples
///
/// ```
/// use capflow::types::Address;
///
/// assert_eq!(Address::from(10) - Address::from(15), -5);
/// ```
impl ops::Sub for Address {
    type Output = imem;

    fn sub(self, other: Self) -> imem {
        self.0.wrapping_sub(other.0) as imem
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

// Addresses print as bare lower case hex everywhere.
impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(self, f)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(self, f)
    }
}
