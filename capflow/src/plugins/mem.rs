//! Function tables of the memory capabilities.

use std::mem::MaybeUninit;

use super::container::{batch_result, Capabilities, Container, LibArc};
use crate::abi::{opt_call, CSliceMut, CSliceRef, OpaqueCallback};
use crate::error::{
    part_result_from_int_void, result_from_int, AsIntResult, PartialError, PartialResult, Result,
};
use crate::mem::{
    MemOps, MemoryView, MemoryViewMetadata, PhysicalMemory, PhysicalMemoryMapping,
    PhysicalMemoryMetadata, PhysicalReadMemOps, PhysicalWriteMemOps, ReadRawMemOps,
    VirtualTranslate, VirtualTranslationCallback, VirtualTranslationFailCallback, VtopRange,
    WriteRawMemOps,
};
use crate::types::{Address, PhysicalAddress};

/// Borrowed view of a single capability of a capability object.
///
/// Returned by the `as_*` accessors of objects whose capability is optional. The view implements
/// the capability trait selected by the function table `V`.
pub struct CapRef<'r, 'a, V: 'static> {
    table: &'static V,
    container: &'r mut Container<'a>,
}

impl<'r, 'a, V: 'static> CapRef<'r, 'a, V> {
    pub(crate) fn new(table: &'static V, container: &'r mut Container<'a>) -> Self {
        Self { table, container }
    }
}

/// Runs a batch with the failure callback wrapped, evaluating to the status code of the batch.
///
/// The code is the backend error if there is one, otherwise `$partial` if any element was
/// reported as failed, otherwise 0.
macro_rules! tracked_batch {
    ($data:expr, $partial:expr, |$ops:ident| $run:expr) => {{
        let (inp, mut out, mut out_fail) = $data.into_parts();
        let mut failed = false;

        let out_cb = &mut |data| opt_call(out.as_deref_mut(), data);
        let fail_cb = &mut |data| {
            failed = true;
            opt_call(out_fail.as_deref_mut(), data)
        };
        let mut out_cb: OpaqueCallback<_> = out_cb.into();
        let mut fail_cb: OpaqueCallback<_> = fail_cb.into();

        let $ops = MemOps::new(inp, Some(&mut out_cb), Some(&mut fail_cb));
        let res: Result<()> = $run;

        res.map_err(PartialError::from)
            .and_then(|_| if failed { Err($partial) } else { Ok(()) })
            .into_int_result()
    }};
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct PhysicalMemoryFunctionTable {
    pub phys_read_raw_iter: extern "C" fn(cont: &mut Container, data: PhysicalReadMemOps) -> i32,
    pub phys_write_raw_iter:
        extern "C" fn(cont: &mut Container, data: PhysicalWriteMemOps) -> i32,
    pub metadata: extern "C" fn(cont: &Container) -> PhysicalMemoryMetadata,
    pub set_mem_map:
        extern "C" fn(cont: &mut Container, mem_map: CSliceRef<PhysicalMemoryMapping>),
    pub phys_view: for<'r, 'a> extern "C" fn(
        cont: &'r mut Container<'a>,
        out: &mut MaybeUninit<MemoryViewInstance<'r>>,
    ),
    pub into_phys_view: extern "C" fn(
        cont: Container<'static>,
        out: &mut MaybeUninit<MemoryViewInstance<'static>>,
    ) -> i32,
}

impl PhysicalMemoryFunctionTable {
    pub fn of<T: PhysicalMemory + 'static>() -> &'static Self {
        &Self {
            phys_read_raw_iter: c_phys_read_raw_iter::<T>,
            phys_write_raw_iter: c_phys_write_raw_iter::<T>,
            metadata: c_phys_metadata::<T>,
            set_mem_map: c_set_mem_map::<T>,
            phys_view: c_phys_view::<T>,
            into_phys_view: c_into_phys_view::<T>,
        }
    }
}

extern "C" fn c_phys_read_raw_iter<T: PhysicalMemory>(
    cont: &mut Container,
    data: PhysicalReadMemOps,
) -> i32 {
    tracked_batch!(data, PartialError::PartialVirtualRead(()), |ops| unsafe {
        cont.instance_mut::<T>().phys_read_raw_iter(ops)
    })
}

extern "C" fn c_phys_write_raw_iter<T: PhysicalMemory>(
    cont: &mut Container,
    data: PhysicalWriteMemOps,
) -> i32 {
    tracked_batch!(data, PartialError::PartialVirtualWrite, |ops| unsafe {
        cont.instance_mut::<T>().phys_write_raw_iter(ops)
    })
}

extern "C" fn c_phys_metadata<T: PhysicalMemory>(cont: &Container) -> PhysicalMemoryMetadata {
    unsafe { cont.instance_ref::<T>() }.metadata()
}

extern "C" fn c_set_mem_map<T: PhysicalMemory>(
    cont: &mut Container,
    mem_map: CSliceRef<PhysicalMemoryMapping>,
) {
    unsafe { cont.instance_mut::<T>() }.set_mem_map(mem_map.as_slice())
}

extern "C" fn c_phys_view<'r, 'a, T: PhysicalMemory + 'static>(
    cont: &'r mut Container<'a>,
    out: &mut MaybeUninit<MemoryViewInstance<'r>>,
) {
    let lib = cont.context().clone();
    let mem = unsafe { cont.instance_mut::<T>() };
    out.write(MemoryViewInstance::new(mem.phys_view(), lib));
}

extern "C" fn c_into_phys_view<T: PhysicalMemory + 'static>(
    cont: Container<'static>,
    out: &mut MaybeUninit<MemoryViewInstance<'static>>,
) -> i32 {
    match unsafe { cont.into_inner::<T>() } {
        Some((mem, lib)) => {
            out.write(MemoryViewInstance::new(mem.into_phys_view(), lib));
            0
        }
        None => super::borrowed_container_error().into_i32(),
    }
}

/// Reads the output of a `phys_view` table entry.
pub(crate) fn phys_view_from_table<'r>(
    table: &PhysicalMemoryFunctionTable,
    cont: &'r mut Container,
) -> MemoryViewInstance<'r> {
    let mut out = MaybeUninit::uninit();
    (table.phys_view)(cont, &mut out);
    // the entry always initializes its output
    unsafe { out.assume_init() }
}

/// Reads the output of an `into_phys_view` table entry.
pub(crate) fn into_phys_view_from_table(
    table: &PhysicalMemoryFunctionTable,
    cont: Container<'static>,
) -> Result<MemoryViewInstance<'static>> {
    let mut out = MaybeUninit::uninit();
    let res = (table.into_phys_view)(cont, &mut out);
    result_from_int(res, out)
}

impl PhysicalMemory for CapRef<'_, '_, PhysicalMemoryFunctionTable> {
    fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()> {
        batch_result((self.table.phys_read_raw_iter)(self.container, data))
    }

    fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()> {
        batch_result((self.table.phys_write_raw_iter)(self.container, data))
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        (self.table.metadata)(self.container)
    }

    fn set_mem_map(&mut self, mem_map: &[PhysicalMemoryMapping]) {
        (self.table.set_mem_map)(self.container, mem_map.into())
    }
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct MemoryViewFunctionTable {
    pub read_raw_iter: extern "C" fn(cont: &mut Container, data: ReadRawMemOps) -> i32,
    pub write_raw_iter: extern "C" fn(cont: &mut Container, data: WriteRawMemOps) -> i32,
    pub metadata: extern "C" fn(cont: &Container) -> MemoryViewMetadata,
    pub read_raw: extern "C" fn(cont: &mut Container, addr: Address, out: CSliceMut<u8>) -> i32,
    pub write_raw: extern "C" fn(cont: &mut Container, addr: Address, data: CSliceRef<u8>) -> i32,
}

impl MemoryViewFunctionTable {
    pub fn of<T: MemoryView>() -> &'static Self {
        &Self {
            read_raw_iter: c_read_raw_iter::<T>,
            write_raw_iter: c_write_raw_iter::<T>,
            metadata: c_view_metadata::<T>,
            read_raw: c_read_raw::<T>,
            write_raw: c_write_raw::<T>,
        }
    }
}

extern "C" fn c_read_raw_iter<T: MemoryView>(cont: &mut Container, data: ReadRawMemOps) -> i32 {
    tracked_batch!(data, PartialError::PartialVirtualRead(()), |ops| unsafe {
        cont.instance_mut::<T>().read_raw_iter(ops)
    })
}

extern "C" fn c_write_raw_iter<T: MemoryView>(cont: &mut Container, data: WriteRawMemOps) -> i32 {
    tracked_batch!(data, PartialError::PartialVirtualWrite, |ops| unsafe {
        cont.instance_mut::<T>().write_raw_iter(ops)
    })
}

extern "C" fn c_view_metadata<T: MemoryView>(cont: &Container) -> MemoryViewMetadata {
    unsafe { cont.instance_ref::<T>() }.metadata()
}

extern "C" fn c_read_raw<T: MemoryView>(
    cont: &mut Container,
    addr: Address,
    out: CSliceMut<u8>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .read_raw_into(addr, out.into_slice())
        .into_int_result()
}

extern "C" fn c_write_raw<T: MemoryView>(
    cont: &mut Container,
    addr: Address,
    data: CSliceRef<u8>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .write_raw(addr, data.as_slice())
        .into_int_result()
}

/// Forwards the memory view of a container through its function table.
///
/// Shared by every capability object exposing [`MemoryView`].
pub(crate) mod view_fwd {
    use super::*;

    pub fn read_raw_iter(
        table: &MemoryViewFunctionTable,
        cont: &mut Container,
        data: ReadRawMemOps,
    ) -> Result<()> {
        batch_result((table.read_raw_iter)(cont, data))
    }

    pub fn write_raw_iter(
        table: &MemoryViewFunctionTable,
        cont: &mut Container,
        data: WriteRawMemOps,
    ) -> Result<()> {
        batch_result((table.write_raw_iter)(cont, data))
    }

    pub fn read_raw_into(
        table: &MemoryViewFunctionTable,
        cont: &mut Container,
        addr: Address,
        out: &mut [u8],
    ) -> PartialResult<()> {
        part_result_from_int_void((table.read_raw)(cont, addr, out.into()))
    }

    pub fn write_raw(
        table: &MemoryViewFunctionTable,
        cont: &mut Container,
        addr: Address,
        data: &[u8],
    ) -> PartialResult<()> {
        part_result_from_int_void((table.write_raw)(cont, addr, data.into()))
    }
}

impl MemoryView for CapRef<'_, '_, MemoryViewFunctionTable> {
    fn read_raw_iter(&mut self, data: ReadRawMemOps) -> Result<()> {
        view_fwd::read_raw_iter(self.table, self.container, data)
    }

    fn write_raw_iter(&mut self, data: WriteRawMemOps) -> Result<()> {
        view_fwd::write_raw_iter(self.table, self.container, data)
    }

    fn metadata(&self) -> MemoryViewMetadata {
        (self.table.metadata)(self.container)
    }

    fn read_raw_into(&mut self, addr: Address, out: &mut [u8]) -> PartialResult<()> {
        view_fwd::read_raw_into(self.table, self.container, addr, out)
    }

    fn write_raw(&mut self, addr: Address, data: &[u8]) -> PartialResult<()> {
        view_fwd::write_raw(self.table, self.container, addr, data)
    }
}

/// Physical memory projected as a [`MemoryView`].
///
/// Created from the `phys_view` and `into_phys_view` entries of a physical memory function table.
/// The borrowing form keeps the physical memory it was created from borrowed.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct MemoryViewInstance<'a> {
    memory_view: &'static MemoryViewFunctionTable,
    container: Container<'a>,
}

impl<'a> MemoryViewInstance<'a> {
    pub fn new<T: MemoryView + 'a>(view: T, lib: LibArc) -> Self {
        Self {
            memory_view: MemoryViewFunctionTable::of::<T>(),
            container: Container::new(view, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::MEMORY_VIEW
    }
}

impl MemoryView for MemoryViewInstance<'_> {
    fn read_raw_iter(&mut self, data: ReadRawMemOps) -> Result<()> {
        view_fwd::read_raw_iter(self.memory_view, &mut self.container, data)
    }

    fn write_raw_iter(&mut self, data: WriteRawMemOps) -> Result<()> {
        view_fwd::write_raw_iter(self.memory_view, &mut self.container, data)
    }

    fn metadata(&self) -> MemoryViewMetadata {
        (self.memory_view.metadata)(&self.container)
    }

    fn read_raw_into(&mut self, addr: Address, out: &mut [u8]) -> PartialResult<()> {
        view_fwd::read_raw_into(self.memory_view, &mut self.container, addr, out)
    }

    fn write_raw(&mut self, addr: Address, data: &[u8]) -> PartialResult<()> {
        view_fwd::write_raw(self.memory_view, &mut self.container, addr, data)
    }
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct VirtualTranslateFunctionTable {
    pub virt_to_phys_list: extern "C" fn(
        cont: &mut Container,
        addrs: CSliceRef<VtopRange>,
        out: VirtualTranslationCallback,
        out_fail: VirtualTranslationFailCallback,
    ),
    pub virt_to_phys_range: extern "C" fn(
        cont: &mut Container,
        start: Address,
        end: Address,
        out: VirtualTranslationCallback,
    ),
    pub virt_translation_map_range: extern "C" fn(
        cont: &mut Container,
        start: Address,
        end: Address,
        out: VirtualTranslationCallback,
    ),
    pub virt_to_phys: extern "C" fn(
        cont: &mut Container,
        address: Address,
        out: &mut MaybeUninit<PhysicalAddress>,
    ) -> i32,
}

impl VirtualTranslateFunctionTable {
    pub fn of<T: VirtualTranslate>() -> &'static Self {
        &Self {
            virt_to_phys_list: c_virt_to_phys_list::<T>,
            virt_to_phys_range: c_virt_to_phys_range::<T>,
            virt_translation_map_range: c_virt_translation_map_range::<T>,
            virt_to_phys: c_virt_to_phys::<T>,
        }
    }
}

extern "C" fn c_virt_to_phys_list<T: VirtualTranslate>(
    cont: &mut Container,
    addrs: CSliceRef<VtopRange>,
    out: VirtualTranslationCallback,
    out_fail: VirtualTranslationFailCallback,
) {
    unsafe { cont.instance_mut::<T>() }.virt_to_phys_list(addrs.as_slice(), out, out_fail)
}

extern "C" fn c_virt_to_phys_range<T: VirtualTranslate>(
    cont: &mut Container,
    start: Address,
    end: Address,
    out: VirtualTranslationCallback,
) {
    unsafe { cont.instance_mut::<T>() }.virt_to_phys_range(start, end, out)
}

extern "C" fn c_virt_translation_map_range<T: VirtualTranslate>(
    cont: &mut Container,
    start: Address,
    end: Address,
    out: VirtualTranslationCallback,
) {
    unsafe { cont.instance_mut::<T>() }.virt_translation_map_range(start, end, out)
}

extern "C" fn c_virt_to_phys<T: VirtualTranslate>(
    cont: &mut Container,
    address: Address,
    out: &mut MaybeUninit<PhysicalAddress>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .virt_to_phys(address)
        .into_int_out_result(out)
}

impl VirtualTranslate for CapRef<'_, '_, VirtualTranslateFunctionTable> {
    fn virt_to_phys_list(
        &mut self,
        addrs: &[VtopRange],
        out: VirtualTranslationCallback,
        out_fail: VirtualTranslationFailCallback,
    ) {
        (self.table.virt_to_phys_list)(self.container, addrs.into(), out, out_fail)
    }

    fn virt_to_phys_range(
        &mut self,
        start: Address,
        end: Address,
        out: VirtualTranslationCallback,
    ) {
        (self.table.virt_to_phys_range)(self.container, start, end, out)
    }

    fn virt_translation_map_range(
        &mut self,
        start: Address,
        end: Address,
        out: VirtualTranslationCallback,
    ) {
        (self.table.virt_translation_map_range)(self.container, start, end, out)
    }

    fn virt_to_phys(&mut self, address: Address) -> Result<PhysicalAddress> {
        let mut out = MaybeUninit::uninit();
        let res = (self.table.virt_to_phys)(self.container, address, &mut out);
        result_from_int(res, out)
    }
}
