//! Batch operation descriptors shared by all memory capabilities.

use crate::abi::{CIterator, CSliceMut, CSliceRef, CTup2, CTup3, OpaqueCallback};
use crate::types::{umem, Address, PhysicalAddress};

/// Raw read element: target address, caller metadata address, buffer.
///
/// The metadata address is handed back in the callbacks untouched. Callers usually put the
/// original target address there, so a translated read can report the address it was asked for.
pub type ReadDataRaw<'a> = CTup3<Address, Address, CSliceMut<'a, u8>>;
/// Read element as reported back to the callbacks: metadata address and buffer.
pub type ReadData<'a> = CTup2<Address, CSliceMut<'a, u8>>;

pub type WriteDataRaw<'a> = CTup3<Address, Address, CSliceRef<'a, u8>>;
pub type WriteData<'a> = CTup2<Address, CSliceRef<'a, u8>>;

/// Physical read element: physical address, metadata address, buffer.
pub type PhysicalReadData<'a> = CTup3<PhysicalAddress, Address, CSliceMut<'a, u8>>;
pub type PhysicalWriteData<'a> = CTup3<PhysicalAddress, Address, CSliceRef<'a, u8>>;

/// Virtual address range to translate: start and size.
pub type VtopRange = CTup2<Address, umem>;

pub type ReadCallback<'a, 'b> = OpaqueCallback<'a, ReadData<'b>>;
pub type WriteCallback<'a, 'b> = OpaqueCallback<'a, WriteData<'b>>;

/// Data needed to perform a batch of memory operations.
///
/// `inp` lazily produces the operations. Every element it produces is reported exactly once,
/// in order, either to `out` (success) or to `out_fail` (failure). A missing callback simply
/// discards the corresponding reports.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct MemOps<'a: 'c, 'b, 'c, T: 'b, P: 'a> {
    pub inp: CIterator<'b, T>,
    pub out: Option<&'c mut OpaqueCallback<'a, P>>,
    pub out_fail: Option<&'c mut OpaqueCallback<'a, P>>,
}

impl<'a: 'c, 'b, 'c, T: 'b, P: 'a> MemOps<'a, 'b, 'c, T, P> {
    pub fn new(
        inp: impl Into<CIterator<'b, T>>,
        out: Option<&'c mut OpaqueCallback<'a, P>>,
        out_fail: Option<&'c mut OpaqueCallback<'a, P>>,
    ) -> Self {
        Self {
            inp: inp.into(),
            out,
            out_fail,
        }
    }

    /// Splits the descriptor into its parts.
    pub fn into_parts(
        self,
    ) -> (
        CIterator<'b, T>,
        Option<&'c mut OpaqueCallback<'a, P>>,
        Option<&'c mut OpaqueCallback<'a, P>>,
    ) {
        (self.inp, self.out, self.out_fail)
    }
}

impl<'a: 'c, 'b, 'c, T: 'b, I: Into<CIterator<'b, T>>, P: 'a> From<I>
    for MemOps<'a, 'b, 'c, T, P>
{
    fn from(inp: I) -> Self {
        Self {
            inp: inp.into(),
            out: None,
            out_fail: None,
        }
    }
}

pub type ReadRawMemOps<'buf, 'a, 'b, 'c> = MemOps<'a, 'b, 'c, ReadDataRaw<'buf>, ReadData<'buf>>;
pub type WriteRawMemOps<'buf, 'a, 'b, 'c> =
    MemOps<'a, 'b, 'c, WriteDataRaw<'buf>, WriteData<'buf>>;
pub type PhysicalReadMemOps<'buf, 'a, 'b, 'c> =
    MemOps<'a, 'b, 'c, PhysicalReadData<'buf>, ReadData<'buf>>;
pub type PhysicalWriteMemOps<'buf, 'a, 'b, 'c> =
    MemOps<'a, 'b, 'c, PhysicalWriteData<'buf>, WriteData<'buf>>;
