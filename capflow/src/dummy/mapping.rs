use crate::abi::{opt_call, CTup2, CTup3};
use crate::error::Result;
use crate::mem::{
    MemOps, MemoryViewMetadata, PhysicalMemory, ReadRawMemOps, VirtualTranslation,
    VirtualTranslationCallback, VirtualTranslationFail, VirtualTranslationFailCallback,
    VtopRange, WriteRawMemOps,
};
use crate::types::{umem, Address, PhysicalAddress};

/// Contiguous virtual range backed by a contiguous physical range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinearMapping {
    pub virt_base: Address,
    pub phys_base: Address,
    pub size: umem,
}

impl LinearMapping {
    fn virt_end(&self) -> umem {
        self.virt_base.to_umem() + self.size
    }

    /// Physical address of `len` bytes at `addr`, if all of them are mapped.
    pub fn translate(&self, addr: Address, len: usize) -> Option<PhysicalAddress> {
        let start = addr.to_umem();
        let end = start.checked_add(len as umem)?;

        if start >= self.virt_base.to_umem() && end <= self.virt_end() {
            Some(PhysicalAddress::from(
                self.phys_base + (start - self.virt_base.to_umem()),
            ))
        } else {
            None
        }
    }

    pub fn read(&self, mem: &mut impl PhysicalMemory, data: ReadRawMemOps) -> Result<()> {
        let (inp, mut out, mut out_fail) = data.into_parts();

        for CTup3(addr, meta, buf) in inp {
            match self.translate(addr, buf.len()) {
                Some(phys) => {
                    let mut item = std::iter::once(CTup3(phys, meta, buf));
                    mem.phys_read_raw_iter(MemOps::new(
                        &mut item,
                        out.as_deref_mut(),
                        out_fail.as_deref_mut(),
                    ))?;
                }
                None => {
                    opt_call(out_fail.as_deref_mut(), CTup2(meta, buf));
                }
            }
        }

        Ok(())
    }

    pub fn write(&self, mem: &mut impl PhysicalMemory, data: WriteRawMemOps) -> Result<()> {
        let (inp, mut out, mut out_fail) = data.into_parts();

        for CTup3(addr, meta, buf) in inp {
            match self.translate(addr, buf.len()) {
                Some(phys) => {
                    let mut item = std::iter::once(CTup3(phys, meta, buf));
                    mem.phys_write_raw_iter(MemOps::new(
                        &mut item,
                        out.as_deref_mut(),
                        out_fail.as_deref_mut(),
                    ))?;
                }
                None => {
                    opt_call(out_fail.as_deref_mut(), CTup2(meta, buf));
                }
            }
        }

        Ok(())
    }

    /// Splits every range into the unmapped head, the mapped middle and the unmapped tail.
    pub fn virt_to_phys_list(
        &self,
        addrs: &[VtopRange],
        mut out: VirtualTranslationCallback,
        mut out_fail: VirtualTranslationFailCallback,
    ) {
        let (base, end) = (self.virt_base.to_umem(), self.virt_end());

        for &CTup2(addr, size) in addrs {
            let start = addr.to_umem();
            let stop = start.saturating_add(size);

            if start < base {
                let head_end = stop.min(base);
                if !out_fail.call(VirtualTranslationFail {
                    from: addr,
                    size: head_end - start,
                }) {
                    return;
                }
            }

            let (mapped_start, mapped_end) = (start.max(base), stop.min(end));
            if mapped_start < mapped_end
                && !out.call(VirtualTranslation {
                    in_virtual: Address::from(mapped_start),
                    size: mapped_end - mapped_start,
                    out_physical: PhysicalAddress::from(
                        self.phys_base + (mapped_start - base),
                    ),
                })
            {
                return;
            }

            if stop > end {
                let tail_start = start.max(end);
                if !out_fail.call(VirtualTranslationFail {
                    from: Address::from(tail_start),
                    size: stop - tail_start,
                }) {
                    return;
                }
            }
        }
    }

    pub fn metadata(&self) -> MemoryViewMetadata {
        MemoryViewMetadata {
            max_address: Address::from(self.virt_end().saturating_sub(1)),
            real_size: self.size,
            readonly: false,
            little_endian: true,
            arch_bits: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::VirtualTranslate;

    struct Mapped(LinearMapping);

    impl VirtualTranslate for Mapped {
        fn virt_to_phys_list(
            &mut self,
            addrs: &[VtopRange],
            out: VirtualTranslationCallback,
            out_fail: VirtualTranslationFailCallback,
        ) {
            self.0.virt_to_phys_list(addrs, out, out_fail)
        }
    }

    fn mapping() -> LinearMapping {
        LinearMapping {
            virt_base: Address::from(0x10000u64),
            phys_base: Address::from(0x4000u64),
            size: 0x2000,
        }
    }

    #[test]
    fn translate_bounds() {
        let m = mapping();
        assert_eq!(
            m.translate(Address::from(0x10010u64), 4),
            Some(PhysicalAddress::from(0x4010u64))
        );
        assert_eq!(m.translate(Address::from(0x11FFEu64), 4), None);
        assert_eq!(m.translate(Address::from(0xFFFFu64), 1), None);
    }

    #[test]
    fn range_is_split() {
        let mut m = Mapped(mapping());
        let mut hits = vec![];
        let mut fails = vec![];

        m.virt_to_phys_list(
            &[CTup2(Address::from(0xF000u64), 0x4000)],
            (&mut hits).into(),
            (&mut fails).into(),
        );

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].in_virtual, Address::from(0x10000u64));
        assert_eq!(hits[0].size, 0x2000);
        assert_eq!(
            fails,
            vec![
                VirtualTranslationFail {
                    from: Address::from(0xF000u64),
                    size: 0x1000
                },
                VirtualTranslationFail {
                    from: Address::from(0x12000u64),
                    size: 0x1000
                },
            ]
        );
    }
}
