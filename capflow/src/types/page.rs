//! Page attributes reported by address translation.

use bitflags::bitflags;

bitflags! {
    /// Attributes of the page a physical address was found in.
    #[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
    #[repr(transparent)]
    #[derive(::abi_stable::StableAbi)]
    pub struct PageType: u8 {
        const NONE = 0b0000_0000;
        const UNKNOWN = 0b0000_0001;
        const PAGE_TABLE = 0b0000_0010;
        const WRITEABLE = 0b0000_0100;
        const READ_ONLY = 0b0000_1000;
        const NOEXEC = 0b0001_0000;
    }
}

impl PageType {
    /// Replaces the access bits, `UNKNOWN` is cleared along with them.
    pub fn write(self, writeable: bool) -> Self {
        let rest = self - (Self::WRITEABLE | Self::READ_ONLY | Self::UNKNOWN);
        rest | if writeable {
            Self::WRITEABLE
        } else {
            Self::READ_ONLY
        }
    }

    pub fn noexec(self, noexec: bool) -> Self {
        let mut ret = self;
        ret.set(Self::NOEXEC, noexec);
        ret
    }
}

impl Default for PageType {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_bits() {
        let ty = PageType::default().write(true).noexec(true);
        assert_eq!(ty, PageType::WRITEABLE | PageType::NOEXEC);
        assert_eq!(ty.write(false), PageType::READ_ONLY | PageType::NOEXEC);
        assert_eq!(ty.noexec(false), PageType::WRITEABLE);
    }
}
