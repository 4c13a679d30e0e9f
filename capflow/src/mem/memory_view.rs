use std::mem::MaybeUninit;

use super::mem_data::*;
use crate::abi::{opt_call, CTup2, CTup3, OpaqueCallback};
use crate::dataview::{Pod, PodMethods};
use crate::error::{PartialError, PartialResult, PartialResultExt, Result};
use crate::types::Address;

/// The `MemoryView` trait implements generic access to memory, no matter if it is a process
/// virtual memory, or machine's physical memory.
///
/// Only the two batch functions and [`metadata`](MemoryView::metadata) need to be provided.
///
/// # Examples
///
/// Reading from a `MemoryView`:
/// ```
/// use capflow::mem::{MemoryView, PhysicalMemory};
/// use capflow::types::Address;
///
/// fn read(mem: &mut impl MemoryView, read_addr: Address) -> u64 {
///     mem.read::<u64>(read_addr).unwrap()
/// }
///
/// # #[cfg(feature = "dummy_mem")]
/// # {
/// # use capflow::dummy::DummyMemory;
/// # use capflow::types::size;
/// let mut mem = DummyMemory::new(size::mb(1));
/// mem.phys_write(0x100.into(), &0x00ff_00ff_00ff_00ffu64).unwrap();
/// assert_eq!(read(&mut mem.phys_view(), 0x100.into()), 0x00ff_00ff_00ff_00ff);
/// # }
/// ```
pub trait MemoryView: Send {
    /// Reads a batch of memory locations.
    ///
    /// Every element is reported back in order, to `out` if it was read completely and to
    /// `out_fail` otherwise.
    fn read_raw_iter(&mut self, data: ReadRawMemOps) -> Result<()>;

    /// Writes a batch of memory locations.
    fn write_raw_iter(&mut self, data: WriteRawMemOps) -> Result<()>;

    fn metadata(&self) -> MemoryViewMetadata;

    // Read helpers

    /// Reads a batch of locations, reporting whether any of them failed.
    ///
    /// A partial failure is not a hard error. Callers that need to know which elements failed
    /// pass an `out_fail` callback.
    fn read_iter<'a>(
        &mut self,
        inp: impl Iterator<Item = ReadData<'a>>,
        out: Option<&mut ReadCallback<'_, 'a>>,
        out_fail: Option<&mut ReadCallback<'_, 'a>>,
    ) -> PartialResult<()>
    where
        Self: Sized,
    {
        let (mut out, mut out_fail) = (out, out_fail);
        let mut failed = false;

        let out_cb = &mut |data: ReadData<'a>| opt_call(out.as_deref_mut(), data);
        let fail_cb = &mut |data: ReadData<'a>| {
            failed = true;
            opt_call(out_fail.as_deref_mut(), data)
        };
        let mut out_cb: OpaqueCallback<_> = out_cb.into();
        let mut fail_cb: OpaqueCallback<_> = fail_cb.into();

        let mut inp = inp.map(|CTup2(addr, buf)| CTup3(addr, addr, buf));
        self.read_raw_iter(MemOps::new(
            &mut inp,
            Some(&mut out_cb),
            Some(&mut fail_cb),
        ))?;

        if failed {
            Err(PartialError::PartialVirtualRead(()))
        } else {
            Ok(())
        }
    }

    /// Reads a list of locations. Failed locations are zero filled.
    fn read_raw_list(&mut self, data: &mut [ReadData]) -> PartialResult<()>
    where
        Self: Sized,
    {
        let fail = &mut |CTup2(_, mut buf): ReadData| {
            buf.iter_mut().for_each(|b| *b = 0);
            true
        };
        let mut fail: OpaqueCallback<_> = fail.into();

        let inp = data
            .iter_mut()
            .map(|CTup2(addr, buf)| CTup2(*addr, (&mut **buf).into()));

        self.read_iter(inp, None, Some(&mut fail))
    }

    fn read_raw_into(&mut self, addr: Address, out: &mut [u8]) -> PartialResult<()>
    where
        Self: Sized,
    {
        self.read_raw_list(&mut [CTup2(addr, out.into())])
    }

    fn read_raw(&mut self, addr: Address, len: usize) -> PartialResult<Vec<u8>>
    where
        Self: Sized,
    {
        let mut buf = vec![0u8; len];
        self.read_raw_into(addr, &mut buf).map_data(|_| buf)
    }

    fn read_into<T: Pod + ?Sized>(&mut self, addr: Address, out: &mut T) -> PartialResult<()>
    where
        Self: Sized,
    {
        self.read_raw_into(addr, out.as_bytes_mut())
    }

    /// Reads a single `Pod` value. Bytes that could not be read are zero.
    fn read<T: Pod + Sized>(&mut self, addr: Address) -> PartialResult<T>
    where
        Self: Sized,
    {
        // Pod types are valid for any bit pattern, including all zeroes
        let mut obj: T = unsafe { MaybeUninit::zeroed().assume_init() };
        self.read_into(addr, &mut obj).map_data(|_| obj)
    }

    // Write helpers

    /// Writes a batch of locations, reporting whether any of them failed.
    fn write_iter<'a>(
        &mut self,
        inp: impl Iterator<Item = WriteData<'a>>,
        out: Option<&mut WriteCallback<'_, 'a>>,
        out_fail: Option<&mut WriteCallback<'_, 'a>>,
    ) -> PartialResult<()>
    where
        Self: Sized,
    {
        let (mut out, mut out_fail) = (out, out_fail);
        let mut failed = false;

        let out_cb = &mut |data: WriteData<'a>| opt_call(out.as_deref_mut(), data);
        let fail_cb = &mut |data: WriteData<'a>| {
            failed = true;
            opt_call(out_fail.as_deref_mut(), data)
        };
        let mut out_cb: OpaqueCallback<_> = out_cb.into();
        let mut fail_cb: OpaqueCallback<_> = fail_cb.into();

        let mut inp = inp.map(|CTup2(addr, buf)| CTup3(addr, addr, buf));
        self.write_raw_iter(MemOps::new(
            &mut inp,
            Some(&mut out_cb),
            Some(&mut fail_cb),
        ))?;

        if failed {
            Err(PartialError::PartialVirtualWrite)
        } else {
            Ok(())
        }
    }

    fn write_raw_list(&mut self, data: &[WriteData]) -> PartialResult<()>
    where
        Self: Sized,
    {
        self.write_iter(data.iter().copied(), None, None)
    }

    fn write_raw(&mut self, addr: Address, data: &[u8]) -> PartialResult<()>
    where
        Self: Sized,
    {
        self.write_raw_list(&[CTup2(addr, data.into())])
    }

    fn write<T: Pod + ?Sized>(&mut self, addr: Address, data: &T) -> PartialResult<()>
    where
        Self: Sized,
    {
        self.write_raw(addr, data.as_bytes())
    }

    /// Reads a null terminated string of up to `max_len` bytes.
    fn read_char_string_n(&mut self, addr: Address, max_len: usize) -> Result<String>
    where
        Self: Sized,
    {
        let mut buf = self.read_raw(addr, max_len).data_part()?;
        if let Some(n) = buf.iter().position(|&c| c == 0) {
            buf.truncate(n);
        }
        Ok(String::from_utf8_lossy(&buf).to_string())
    }
}

impl<T: MemoryView + ?Sized> MemoryView for &mut T {
    fn read_raw_iter(&mut self, data: ReadRawMemOps) -> Result<()> {
        (**self).read_raw_iter(data)
    }

    fn write_raw_iter(&mut self, data: WriteRawMemOps) -> Result<()> {
        (**self).write_raw_iter(data)
    }

    fn metadata(&self) -> MemoryViewMetadata {
        (**self).metadata()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct MemoryViewMetadata {
    pub max_address: Address,
    pub real_size: u64,
    pub readonly: bool,
    pub little_endian: bool,
    pub arch_bits: u8,
}
