use std::mem::MaybeUninit;

use super::mem_data::*;
use super::memory_view::{MemoryView, MemoryViewMetadata};
use crate::abi::{opt_call, CTup2, CTup3, OpaqueCallback};
use crate::dataview::{Pod, PodMethods};
use crate::error::{PartialError, PartialResult, PartialResultExt, Result};
use crate::types::{umem, Address, PhysicalAddress};

/// The [`PhysicalMemory`] trait is implemented by memory backends (connectors)
/// and provides a generic way to read and write from/to physical memory.
///
/// Only the two batch functions and [`metadata`](PhysicalMemory::metadata) need to be provided,
/// everything else is built on top of them.
///
/// # Examples
///
/// Implementing [`PhysicalMemory`] for a memory backend:
/// ```
/// use capflow::abi::{opt_call, CTup2, CTup3};
/// use capflow::error::Result;
/// use capflow::mem::{
///     PhysicalMemory, PhysicalMemoryMetadata, PhysicalReadMemOps, PhysicalWriteMemOps,
/// };
/// use capflow::types::Address;
///
/// pub struct MemoryBackend {
///     mem: Box<[u8]>,
/// }
///
/// impl PhysicalMemory for MemoryBackend {
///     fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()> {
///         let (inp, mut out, mut out_fail) = data.into_parts();
///         for CTup3(addr, meta, mut buf) in inp {
///             let start = addr.to_umem() as usize;
///             match self.mem.get(start..start + buf.len()) {
///                 Some(src) => {
///                     buf.copy_from_slice(src);
///                     opt_call(out.as_deref_mut(), CTup2(meta, buf));
///                 }
///                 None => {
///                     opt_call(out_fail.as_deref_mut(), CTup2(meta, buf));
///                 }
///             }
///         }
///         Ok(())
///     }
///
///     fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()> {
///         let (inp, mut out, mut out_fail) = data.into_parts();
///         for CTup3(addr, meta, buf) in inp {
///             let start = addr.to_umem() as usize;
///             match self.mem.get_mut(start..start + buf.len()) {
///                 Some(dst) => {
///                     dst.copy_from_slice(&buf);
///                     opt_call(out.as_deref_mut(), CTup2(meta, buf));
///                 }
///                 None => {
///                     opt_call(out_fail.as_deref_mut(), CTup2(meta, buf));
///                 }
///             }
///         }
///         Ok(())
///     }
///
///     fn metadata(&self) -> PhysicalMemoryMetadata {
///         PhysicalMemoryMetadata {
///             max_address: Address::from(self.mem.len() - 1),
///             real_size: self.mem.len() as u64,
///             readonly: false,
///             ideal_batch_size: u32::MAX,
///         }
///     }
/// }
///
/// let mut mem = MemoryBackend { mem: vec![0; 0x1000].into_boxed_slice() };
/// mem.phys_write(0x10.into(), &0xDEADu32).unwrap();
/// assert_eq!(mem.phys_read::<u32>(0x10.into()).unwrap(), 0xDEAD);
/// assert!(mem.phys_read::<u32>(0x2000.into()).is_err());
/// ```
pub trait PhysicalMemory: Send {
    /// Reads a batch of physical memory locations.
    ///
    /// Every element is reported back in order, to `out` if it was read completely and to
    /// `out_fail` otherwise. Unreadable locations are not an error of the call.
    fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()>;

    /// Writes a batch of physical memory locations.
    fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()>;

    /// Retrieves metadata about the physical memory.
    fn metadata(&self) -> PhysicalMemoryMetadata;

    /// Sets the memory mapping for the physical memory.
    ///
    /// Connectors that cannot acquire the memory layout themselves get it from the OS layer
    /// through this function. The default implementation ignores the mapping.
    fn set_mem_map(&mut self, _mem_map: &[PhysicalMemoryMapping]) {}

    /// Reads a batch of locations, reporting whether any of them failed.
    fn phys_read_iter<'a>(
        &mut self,
        inp: impl Iterator<Item = PhysicalReadData<'a>>,
        out: Option<&mut OpaqueCallback<ReadData<'a>>>,
        out_fail: Option<&mut OpaqueCallback<ReadData<'a>>>,
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

        let mut inp = inp;
        self.phys_read_raw_iter(MemOps::new(
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

    /// Writes a batch of locations, reporting whether any of them failed.
    fn phys_write_iter<'a>(
        &mut self,
        inp: impl Iterator<Item = PhysicalWriteData<'a>>,
        out: Option<&mut OpaqueCallback<WriteData<'a>>>,
        out_fail: Option<&mut OpaqueCallback<WriteData<'a>>>,
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

        let mut inp = inp;
        self.phys_write_raw_iter(MemOps::new(
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

    /// Reads a list of locations, zero filling the ones that failed.
    fn phys_read_raw_list(&mut self, data: &mut [PhysicalReadData]) -> PartialResult<()>
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
            .map(|CTup3(addr, meta, buf)| CTup3(*addr, *meta, (&mut **buf).into()));

        self.phys_read_iter(inp, None, Some(&mut fail))
    }

    /// Writes a list of locations, skipping the ones that failed.
    fn phys_write_raw_list(&mut self, data: &[PhysicalWriteData]) -> PartialResult<()>
    where
        Self: Sized,
    {
        let inp = data
            .iter()
            .map(|CTup3(addr, meta, buf)| CTup3(*addr, *meta, *buf));

        self.phys_write_iter(inp, None, None)
    }

    fn phys_read_raw_into(&mut self, addr: PhysicalAddress, out: &mut [u8]) -> Result<()>
    where
        Self: Sized,
    {
        self.phys_read_iter(
            Some(CTup3(addr, addr.address(), out.into())).into_iter(),
            None,
            None,
        )
        .data()
    }

    fn phys_read_into<T: Pod + ?Sized>(&mut self, addr: PhysicalAddress, out: &mut T) -> Result<()>
    where
        Self: Sized,
    {
        self.phys_read_raw_into(addr, out.as_bytes_mut())
    }

    fn phys_read_raw(&mut self, addr: PhysicalAddress, len: usize) -> Result<Vec<u8>>
    where
        Self: Sized,
    {
        let mut buf = vec![0u8; len];
        self.phys_read_raw_into(addr, &mut buf)?;
        Ok(buf)
    }

    fn phys_read<T: Pod + Sized>(&mut self, addr: PhysicalAddress) -> Result<T>
    where
        Self: Sized,
    {
        // Pod types are valid for any bit pattern, including all zeroes
        let mut obj: T = unsafe { MaybeUninit::zeroed().assume_init() };
        self.phys_read_into(addr, &mut obj)?;
        Ok(obj)
    }

    fn phys_write_raw(&mut self, addr: PhysicalAddress, data: &[u8]) -> Result<()>
    where
        Self: Sized,
    {
        self.phys_write_iter(
            Some(CTup3(addr, addr.address(), data.into())).into_iter(),
            None,
            None,
        )
        .data()
    }

    fn phys_write<T: Pod + ?Sized>(&mut self, addr: PhysicalAddress, data: &T) -> Result<()>
    where
        Self: Sized,
    {
        self.phys_write_raw(addr, data.as_bytes())
    }

    /// Borrows the physical memory as a [`MemoryView`].
    fn phys_view(&mut self) -> PhysicalMemoryView<&mut Self>
    where
        Self: Sized,
    {
        PhysicalMemoryView { mem: self }
    }

    /// Turns the physical memory into a [`MemoryView`].
    fn into_phys_view(self) -> PhysicalMemoryView<Self>
    where
        Self: Sized,
    {
        PhysicalMemoryView { mem: self }
    }
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for &mut T {
    fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()> {
        (**self).phys_read_raw_iter(data)
    }

    fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()> {
        (**self).phys_write_raw_iter(data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        (**self).metadata()
    }

    fn set_mem_map(&mut self, mem_map: &[PhysicalMemoryMapping]) {
        (**self).set_mem_map(mem_map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct PhysicalMemoryMetadata {
    pub max_address: Address,
    pub real_size: umem,
    pub readonly: bool,
    /// Number of elements the backend prefers to receive in a single batch.
    pub ideal_batch_size: u32,
}

/// A single region of a physical memory map.
///
/// Physical addresses in `base..base + size` are backed by the connector at `real_base..`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct PhysicalMemoryMapping {
    pub base: Address,
    pub size: umem,
    pub real_base: Address,
}

/// [`MemoryView`] over a [`PhysicalMemory`] object.
///
/// Addresses of the view are physical addresses without page information.
#[repr(C)]
#[derive(Clone)]
pub struct PhysicalMemoryView<T> {
    mem: T,
}

impl<T> PhysicalMemoryView<T> {
    pub fn into_inner(self) -> T {
        self.mem
    }
}

impl<T: PhysicalMemory> MemoryView for PhysicalMemoryView<T> {
    fn read_raw_iter(&mut self, data: ReadRawMemOps) -> Result<()> {
        let (inp, out, out_fail) = data.into_parts();
        let mut inp =
            inp.map(|CTup3(addr, meta, buf)| CTup3(PhysicalAddress::from(addr), meta, buf));
        self.mem
            .phys_read_raw_iter(MemOps::new(&mut inp, out, out_fail))
    }

    fn write_raw_iter(&mut self, data: WriteRawMemOps) -> Result<()> {
        let (inp, out, out_fail) = data.into_parts();
        let mut inp =
            inp.map(|CTup3(addr, meta, buf)| CTup3(PhysicalAddress::from(addr), meta, buf));
        self.mem
            .phys_write_raw_iter(MemOps::new(&mut inp, out, out_fail))
    }

    fn metadata(&self) -> MemoryViewMetadata {
        let PhysicalMemoryMetadata {
            max_address,
            real_size,
            readonly,
            ..
        } = self.mem.metadata();

        MemoryViewMetadata {
            max_address,
            real_size,
            readonly,
            little_endian: cfg!(target_endian = "little"),
            arch_bits: std::mem::size_of::<umem>() as u8 * 8,
        }
    }
}
