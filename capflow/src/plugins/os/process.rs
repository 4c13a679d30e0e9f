//! Process function table and the process capability objects.

use std::mem::MaybeUninit;

use crate::abi::CSliceRef;
use crate::architecture::ArchitectureIdent;
use crate::error::{result_from_int, result_from_int_void, AsIntResult, PartialResult, Result};
use crate::mem::{MemoryView, MemoryViewMetadata, ReadRawMemOps, WriteRawMemOps};
use crate::os::{
    ExportCallback, ImportCallback, ModuleAddressCallback, ModuleInfo, ModuleInfoCallback,
    Process, ProcessInfo, ProcessState, SectionCallback,
};
use crate::plugins::container::{Capabilities, CloneFunctionTable, Container, LibArc};
use crate::plugins::mem::{
    view_fwd, CapRef, MemoryViewFunctionTable, VirtualTranslateFunctionTable,
};
use crate::types::Address;

/// Everything a type needs to be wrapped into a process capability object.
pub trait ProcessGroup: Process + MemoryView {
    fn virt_translate_table(&self) -> Option<&'static VirtualTranslateFunctionTable> {
        None
    }
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct ProcessFunctionTable {
    pub state: extern "C" fn(cont: &mut Container) -> ProcessState,
    pub module_address_list_callback: extern "C" fn(
        cont: &mut Container,
        target_arch: Option<&ArchitectureIdent>,
        callback: ModuleAddressCallback,
    ) -> i32,
    pub module_list_callback: extern "C" fn(
        cont: &mut Container,
        target_arch: Option<&ArchitectureIdent>,
        callback: ModuleInfoCallback,
    ) -> i32,
    pub module_by_address: extern "C" fn(
        cont: &mut Container,
        address: Address,
        architecture: ArchitectureIdent,
        out: &mut MaybeUninit<ModuleInfo>,
    ) -> i32,
    pub module_by_name_arch: extern "C" fn(
        cont: &mut Container,
        name: CSliceRef<u8>,
        architecture: Option<&ArchitectureIdent>,
        out: &mut MaybeUninit<ModuleInfo>,
    ) -> i32,
    pub primary_module_address:
        extern "C" fn(cont: &mut Container, out: &mut MaybeUninit<Address>) -> i32,
    pub module_import_list_callback:
        extern "C" fn(cont: &mut Container, info: &ModuleInfo, callback: ImportCallback) -> i32,
    pub module_export_list_callback:
        extern "C" fn(cont: &mut Container, info: &ModuleInfo, callback: ExportCallback) -> i32,
    pub module_section_list_callback:
        extern "C" fn(cont: &mut Container, info: &ModuleInfo, callback: SectionCallback) -> i32,
    /// Returns a pointer to the info of the process, valid as long as the container is.
    pub info: extern "C" fn(cont: &Container) -> *const ProcessInfo,
}

impl ProcessFunctionTable {
    pub fn of<T: Process>() -> &'static Self {
        &Self {
            state: c_state::<T>,
            module_address_list_callback: c_module_address_list_callback::<T>,
            module_list_callback: c_module_list_callback::<T>,
            module_by_address: c_module_by_address::<T>,
            module_by_name_arch: c_module_by_name_arch::<T>,
            primary_module_address: c_primary_module_address::<T>,
            module_import_list_callback: c_module_import_list_callback::<T>,
            module_export_list_callback: c_module_export_list_callback::<T>,
            module_section_list_callback: c_module_section_list_callback::<T>,
            info: c_info::<T>,
        }
    }
}

extern "C" fn c_state<T: Process>(cont: &mut Container) -> ProcessState {
    unsafe { cont.instance_mut::<T>() }.state()
}

extern "C" fn c_module_address_list_callback<T: Process>(
    cont: &mut Container,
    target_arch: Option<&ArchitectureIdent>,
    callback: ModuleAddressCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_address_list_callback(target_arch, callback)
        .into_int_result()
}

extern "C" fn c_module_list_callback<T: Process>(
    cont: &mut Container,
    target_arch: Option<&ArchitectureIdent>,
    callback: ModuleInfoCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_list_callback(target_arch, callback)
        .into_int_result()
}

extern "C" fn c_module_by_address<T: Process>(
    cont: &mut Container,
    address: Address,
    architecture: ArchitectureIdent,
    out: &mut MaybeUninit<ModuleInfo>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_by_address(address, architecture)
        .into_int_out_result(out)
}

extern "C" fn c_module_by_name_arch<T: Process>(
    cont: &mut Container,
    name: CSliceRef<u8>,
    architecture: Option<&ArchitectureIdent>,
    out: &mut MaybeUninit<ModuleInfo>,
) -> i32 {
    let name = unsafe { name.into_str() };
    unsafe { cont.instance_mut::<T>() }
        .module_by_name_arch(name, architecture)
        .into_int_out_result(out)
}

extern "C" fn c_primary_module_address<T: Process>(
    cont: &mut Container,
    out: &mut MaybeUninit<Address>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .primary_module_address()
        .into_int_out_result(out)
}

extern "C" fn c_module_import_list_callback<T: Process>(
    cont: &mut Container,
    info: &ModuleInfo,
    callback: ImportCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_import_list_callback(info, callback)
        .into_int_result()
}

extern "C" fn c_module_export_list_callback<T: Process>(
    cont: &mut Container,
    info: &ModuleInfo,
    callback: ExportCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_export_list_callback(info, callback)
        .into_int_result()
}

extern "C" fn c_module_section_list_callback<T: Process>(
    cont: &mut Container,
    info: &ModuleInfo,
    callback: SectionCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_section_list_callback(info, callback)
        .into_int_result()
}

extern "C" fn c_info<T: Process>(cont: &Container) -> *const ProcessInfo {
    unsafe { cont.instance_ref::<T>() }.info() as *const _
}

/// Process borrowing an OS.
///
/// Implements [`Process`] and [`MemoryView`]. Virtual address translation is optional and
/// reachable through [`as_virt_translate`](Self::as_virt_translate).
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct ProcessInstance<'a> {
    process: &'static ProcessFunctionTable,
    memory_view: &'static MemoryViewFunctionTable,
    virt_translate: Option<&'static VirtualTranslateFunctionTable>,
    container: Container<'a>,
}

impl<'a> ProcessInstance<'a> {
    pub fn new<T: ProcessGroup + 'a>(process: T, lib: LibArc) -> Self {
        Self {
            process: ProcessFunctionTable::of::<T>(),
            memory_view: MemoryViewFunctionTable::of::<T>(),
            virt_translate: process.virt_translate_table(),
            container: Container::new(process, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        (Capabilities::PROCESS | Capabilities::MEMORY_VIEW)
            .with_opt(Capabilities::VIRTUAL_TRANSLATE, self.virt_translate)
    }
}

/// Process that took over the resources of an OS.
///
/// Same as [`ProcessInstance`], but owns everything it needs and can be cloned.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct IntoProcessInstance {
    clone: &'static CloneFunctionTable,
    process: &'static ProcessFunctionTable,
    memory_view: &'static MemoryViewFunctionTable,
    virt_translate: Option<&'static VirtualTranslateFunctionTable>,
    container: Container<'static>,
}

impl IntoProcessInstance {
    pub fn new<T: ProcessGroup + Clone + 'static>(process: T, lib: LibArc) -> Self {
        Self {
            clone: CloneFunctionTable::of::<T>(),
            process: ProcessFunctionTable::of::<T>(),
            memory_view: MemoryViewFunctionTable::of::<T>(),
            virt_translate: process.virt_translate_table(),
            container: Container::new(process, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        (Capabilities::CLONE | Capabilities::PROCESS | Capabilities::MEMORY_VIEW)
            .with_opt(Capabilities::VIRTUAL_TRANSLATE, self.virt_translate)
    }
}

impl Clone for IntoProcessInstance {
    fn clone(&self) -> Self {
        Self {
            clone: self.clone,
            process: self.process,
            memory_view: self.memory_view,
            virt_translate: self.virt_translate,
            container: (self.clone.clone)(&self.container),
        }
    }
}

macro_rules! impl_process_instance {
    ($ty:ty, $cont:lifetime $(, $gen:lifetime)?) => {
        impl<$($gen)?> $ty {
            pub fn as_virt_translate(
                &mut self,
            ) -> Option<CapRef<'_, $cont, VirtualTranslateFunctionTable>> {
                let table = self.virt_translate?;
                Some(CapRef::new(table, &mut self.container))
            }
        }

        impl<$($gen)?> Process for $ty {
            fn state(&mut self) -> ProcessState {
                (self.process.state)(&mut self.container)
            }

            fn module_address_list_callback(
                &mut self,
                target_arch: Option<&ArchitectureIdent>,
                callback: ModuleAddressCallback,
            ) -> Result<()> {
                result_from_int_void((self.process.module_address_list_callback)(
                    &mut self.container,
                    target_arch,
                    callback,
                ))
            }

            fn module_list_callback(
                &mut self,
                target_arch: Option<&ArchitectureIdent>,
                callback: ModuleInfoCallback,
            ) -> Result<()> {
                result_from_int_void((self.process.module_list_callback)(
                    &mut self.container,
                    target_arch,
                    callback,
                ))
            }

            fn module_by_address(
                &mut self,
                address: Address,
                architecture: ArchitectureIdent,
            ) -> Result<ModuleInfo> {
                let mut out = MaybeUninit::uninit();
                let res = (self.process.module_by_address)(
                    &mut self.container,
                    address,
                    architecture,
                    &mut out,
                );
                result_from_int(res, out)
            }

            fn module_by_name_arch(
                &mut self,
                name: &str,
                architecture: Option<&ArchitectureIdent>,
            ) -> Result<ModuleInfo> {
                let mut out = MaybeUninit::uninit();
                let res = (self.process.module_by_name_arch)(
                    &mut self.container,
                    name.into(),
                    architecture,
                    &mut out,
                );
                result_from_int(res, out)
            }

            fn primary_module_address(&mut self) -> Result<Address> {
                let mut out = MaybeUninit::uninit();
                let res = (self.process.primary_module_address)(&mut self.container, &mut out);
                result_from_int(res, out)
            }

            fn module_import_list_callback(
                &mut self,
                info: &ModuleInfo,
                callback: ImportCallback,
            ) -> Result<()> {
                result_from_int_void((self.process.module_import_list_callback)(
                    &mut self.container,
                    info,
                    callback,
                ))
            }

            fn module_export_list_callback(
                &mut self,
                info: &ModuleInfo,
                callback: ExportCallback,
            ) -> Result<()> {
                result_from_int_void((self.process.module_export_list_callback)(
                    &mut self.container,
                    info,
                    callback,
                ))
            }

            fn module_section_list_callback(
                &mut self,
                info: &ModuleInfo,
                callback: SectionCallback,
            ) -> Result<()> {
                result_from_int_void((self.process.module_section_list_callback)(
                    &mut self.container,
                    info,
                    callback,
                ))
            }

            fn info(&self) -> &ProcessInfo {
                // the info lives inside the instance, which lives as long as the container
                unsafe { &*(self.process.info)(&self.container) }
            }
        }

        impl<$($gen)?> MemoryView for $ty {
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

        impl<$($gen)?> ProcessGroup for $ty {}
    };
}

impl_process_instance!(ProcessInstance<'a>, 'a, 'a);
impl_process_instance!(IntoProcessInstance, 'static);
