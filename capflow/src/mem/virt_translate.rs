use std::cmp::Ordering;

use itertools::Itertools;

use super::mem_data::VtopRange;
use crate::abi::{CTup2, FeedCallback, OpaqueCallback};
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::types::{umem, Address, PhysicalAddress};

/// Virtual to physical address translation of a memory view.
pub trait VirtualTranslate: Send {
    /// Translates a list of virtual ranges.
    ///
    /// Mapped parts of the ranges are reported to `out`, one element per contiguous translation.
    /// Unmapped parts are reported to `out_fail`.
    fn virt_to_phys_list(
        &mut self,
        addrs: &[VtopRange],
        out: VirtualTranslationCallback,
        out_fail: VirtualTranslationFailCallback,
    );

    /// Translates the virtual range `start..end`, ignoring unmapped parts.
    fn virt_to_phys_range(
        &mut self,
        start: Address,
        end: Address,
        out: VirtualTranslationCallback,
    ) {
        self.virt_to_phys_list(
            &[CTup2(start, end.to_umem().saturating_sub(start.to_umem()))],
            out,
            (&mut |_| true).into(),
        )
    }

    /// Translates the virtual range `start..end`, merging adjacent translations.
    ///
    /// Two translations are merged when both their virtual and physical ranges are contiguous
    /// and their pages are of the same type.
    fn virt_translation_map_range(
        &mut self,
        start: Address,
        end: Address,
        out: VirtualTranslationCallback,
    ) {
        let mut set = std::collections::BTreeSet::new();

        self.virt_to_phys_range(
            start,
            end,
            (&mut |v| {
                set.insert(v);
                true
            })
                .into(),
        );

        set.into_iter()
            .coalesce(|a: VirtualTranslation, b: VirtualTranslation| {
                if b.in_virtual == (a.in_virtual + a.size)
                    && b.out_physical.address() == (a.out_physical.address() + a.size)
                    && a.out_physical.page_type() == b.out_physical.page_type()
                {
                    Ok(VirtualTranslation {
                        in_virtual: a.in_virtual,
                        size: a.size + b.size,
                        out_physical: a.out_physical,
                    })
                } else {
                    Err((a, b))
                }
            })
            .feed_into(out);
    }

    /// Translates a single virtual address.
    fn virt_to_phys(&mut self, address: Address) -> Result<PhysicalAddress> {
        let mut out = Err(Error(ErrorOrigin::VirtualTranslate, ErrorKind::OutOfBounds));

        self.virt_to_phys_list(
            &[CTup2(address, 1)],
            (&mut |VirtualTranslation { out_physical, .. }| {
                out = Ok(out_physical);
                false
            })
                .into(),
            (&mut |_| true).into(),
        );

        out
    }

    fn virt_translation_map_vec(&mut self) -> Vec<VirtualTranslation>
    where
        Self: Sized,
    {
        let mut out = vec![];
        self.virt_translation_map_range(Address::null(), Address::invalid(), (&mut out).into());
        out
    }
}

impl<T: VirtualTranslate + ?Sized> VirtualTranslate for &mut T {
    fn virt_to_phys_list(
        &mut self,
        addrs: &[VtopRange],
        out: VirtualTranslationCallback,
        out_fail: VirtualTranslationFailCallback,
    ) {
        (**self).virt_to_phys_list(addrs, out, out_fail)
    }
}

pub type VirtualTranslationCallback<'a> = OpaqueCallback<'a, VirtualTranslation>;
pub type VirtualTranslationFailCallback<'a> = OpaqueCallback<'a, VirtualTranslationFail>;

/// Contiguous virtual range and the physical address its start maps to.
#[repr(C)]
#[derive(Clone, Debug, Eq, Copy)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct VirtualTranslation {
    pub in_virtual: Address,
    pub size: umem,
    pub out_physical: PhysicalAddress,
}

impl Ord for VirtualTranslation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.in_virtual.cmp(&other.in_virtual)
    }
}

impl PartialOrd for VirtualTranslation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VirtualTranslation {
    fn eq(&self, other: &Self) -> bool {
        self.in_virtual == other.in_virtual
    }
}

/// Virtual range that could not be translated.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct VirtualTranslationFail {
    pub from: Address,
    pub size: umem,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageType;

    /// Maps `0x1000..0x5000` with 4k pages, the page at `0x3000` points somewhere else.
    struct Pages;

    impl Pages {
        fn translate(page: umem) -> Option<umem> {
            match page {
                0x1000 | 0x2000 => Some(page + 0x10_0000),
                0x3000 => Some(0x50_0000),
                0x4000 => Some(0x50_1000),
                _ => None,
            }
        }
    }

    impl VirtualTranslate for Pages {
        fn virt_to_phys_list(
            &mut self,
            addrs: &[VtopRange],
            mut out: VirtualTranslationCallback,
            mut out_fail: VirtualTranslationFailCallback,
        ) {
            for &CTup2(addr, size) in addrs {
                let end = addr.to_umem().saturating_add(size);
                let mut cur = addr.to_umem();
                while cur < end {
                    let page = cur & !0xFFF;
                    let chunk = std::cmp::min(page + 0x1000, end) - cur;
                    let keep_going = match Self::translate(page) {
                        Some(phys) => {
                            let pa = PhysicalAddress::with_page(
                                Address::from(phys + (cur - page)),
                                PageType::WRITEABLE,
                                0x1000,
                            );
                            out.call(VirtualTranslation {
                                in_virtual: cur.into(),
                                size: chunk,
                                out_physical: pa,
                            })
                        }
                        None => out_fail.call(VirtualTranslationFail {
                            from: cur.into(),
                            size: chunk,
                        }),
                    };
                    if !keep_going || page >= 0x10000 {
                        return;
                    }
                    cur += chunk;
                }
            }
        }
    }

    #[test]
    fn single() {
        let mut vt = Pages;
        assert_eq!(
            vt.virt_to_phys(Address::from(0x1234)).unwrap().address(),
            Address::from(0x10_1234)
        );
        assert!(vt.virt_to_phys(Address::from(0x9000)).is_err());
    }

    #[test]
    fn map_range_coalesces() {
        let mut vt = Pages;
        let mut out = vec![];
        vt.virt_translation_map_range(
            Address::from(0x1000),
            Address::from(0x5000),
            (&mut out).into(),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].in_virtual, Address::from(0x1000));
        assert_eq!(out[0].size, 0x2000);
        assert_eq!(out[1].in_virtual, Address::from(0x3000));
        assert_eq!(out[1].size, 0x2000);
        assert_eq!(out[1].out_physical.address(), Address::from(0x50_0000));
    }

    #[test]
    fn map_vec_covers_everything() {
        let map = Pages.virt_translation_map_vec();
        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().map(|t| t.size).sum::<umem>(), 0x4000);
    }

    #[test]
    fn failures_reported() {
        let mut vt = Pages;
        let mut ok = vec![];
        let mut fail = vec![];
        vt.virt_to_phys_list(
            &[CTup2(Address::from(0x0), 0x3000)],
            (&mut ok).into(),
            (&mut fail).into(),
        );
        assert_eq!(ok.len(), 2);
        assert_eq!(
            fail,
            vec![VirtualTranslationFail {
                from: Address::from(0),
                size: 0x1000
            }]
        );
    }
}
