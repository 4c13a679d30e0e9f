//! OS function table and the OS capability object.

use std::mem::MaybeUninit;

use super::keyboard::{
    into_keyboard_from_table, keyboard_from_table, IntoKeyboardInstance, KeyboardInstance,
    OsKeyboardFunctionTable,
};
use super::process::{IntoProcessInstance, ProcessInstance};
use crate::abi::CSliceRef;
use crate::error::{
    result_from_int, result_from_int_void, AsIntResult, Error, ErrorKind, ErrorOrigin, Result,
};
use crate::mem::{MemoryView, PhysicalMemory, VirtualTranslate};
use crate::os::{
    AddressCallback, ModuleInfo, ModuleInfoCallback, Os, OsInfo, OsKeyboard, Pid, ProcessInfo,
    ProcessInfoCallback,
};
use crate::plugins::container::{Capabilities, CloneFunctionTable, Container, LibArc};
use crate::plugins::mem::{
    CapRef, MemoryViewFunctionTable, PhysicalMemoryFunctionTable, VirtualTranslateFunctionTable,
};
use crate::types::Address;

/// Everything a type needs to be wrapped into an [`OsInstance`].
///
/// The optional capabilities are reported by returning their function tables, for example
/// `Some(PhysicalMemoryFunctionTable::of::<Self>())` for an OS exposing its physical memory.
pub trait OsGroup: Os + Clone + 'static {
    fn phys_mem_table(&self) -> Option<&'static PhysicalMemoryFunctionTable> {
        None
    }

    fn memory_view_table(&self) -> Option<&'static MemoryViewFunctionTable> {
        None
    }

    fn virt_translate_table(&self) -> Option<&'static VirtualTranslateFunctionTable> {
        None
    }

    fn os_keyboard_table(&self) -> Option<&'static OsKeyboardFunctionTable> {
        None
    }
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct OsFunctionTable {
    pub process_address_list_callback:
        extern "C" fn(cont: &mut Container, callback: AddressCallback) -> i32,
    pub process_info_list_callback:
        extern "C" fn(cont: &mut Container, callback: ProcessInfoCallback) -> i32,
    pub process_info_by_address: extern "C" fn(
        cont: &mut Container,
        address: Address,
        out: &mut MaybeUninit<ProcessInfo>,
    ) -> i32,
    pub process_info_by_name: extern "C" fn(
        cont: &mut Container,
        name: CSliceRef<u8>,
        out: &mut MaybeUninit<ProcessInfo>,
    ) -> i32,
    pub process_info_by_pid:
        extern "C" fn(cont: &mut Container, pid: Pid, out: &mut MaybeUninit<ProcessInfo>) -> i32,
    pub process_by_info: for<'r, 'a> extern "C" fn(
        cont: &'r mut Container<'a>,
        info: ProcessInfo,
        out: &mut MaybeUninit<ProcessInstance<'r>>,
    ) -> i32,
    pub into_process_by_info: extern "C" fn(
        cont: Container<'static>,
        info: ProcessInfo,
        out: &mut MaybeUninit<IntoProcessInstance>,
    ) -> i32,
    pub module_address_list_callback:
        extern "C" fn(cont: &mut Container, callback: AddressCallback) -> i32,
    pub module_list_callback:
        extern "C" fn(cont: &mut Container, callback: ModuleInfoCallback) -> i32,
    pub module_by_address: extern "C" fn(
        cont: &mut Container,
        address: Address,
        out: &mut MaybeUninit<ModuleInfo>,
    ) -> i32,
    pub module_by_name: extern "C" fn(
        cont: &mut Container,
        name: CSliceRef<u8>,
        out: &mut MaybeUninit<ModuleInfo>,
    ) -> i32,
    pub primary_module_address:
        extern "C" fn(cont: &mut Container, out: &mut MaybeUninit<Address>) -> i32,
    /// Returns a pointer to the info of the OS, valid as long as the container is.
    pub info: extern "C" fn(cont: &Container) -> *const OsInfo,
}

impl OsFunctionTable {
    pub fn of<T: OsGroup>() -> &'static Self {
        &Self {
            process_address_list_callback: c_process_address_list_callback::<T>,
            process_info_list_callback: c_process_info_list_callback::<T>,
            process_info_by_address: c_process_info_by_address::<T>,
            process_info_by_name: c_process_info_by_name::<T>,
            process_info_by_pid: c_process_info_by_pid::<T>,
            process_by_info: c_process_by_info::<T>,
            into_process_by_info: c_into_process_by_info::<T>,
            module_address_list_callback: c_module_address_list_callback::<T>,
            module_list_callback: c_module_list_callback::<T>,
            module_by_address: c_module_by_address::<T>,
            module_by_name: c_module_by_name::<T>,
            primary_module_address: c_primary_module_address::<T>,
            info: c_info::<T>,
        }
    }
}

extern "C" fn c_process_address_list_callback<T: OsGroup>(
    cont: &mut Container,
    callback: AddressCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .process_address_list_callback(callback)
        .into_int_result()
}

extern "C" fn c_process_info_list_callback<T: OsGroup>(
    cont: &mut Container,
    callback: ProcessInfoCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .process_info_list_callback(callback)
        .into_int_result()
}

extern "C" fn c_process_info_by_address<T: OsGroup>(
    cont: &mut Container,
    address: Address,
    out: &mut MaybeUninit<ProcessInfo>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .process_info_by_address(address)
        .into_int_out_result(out)
}

extern "C" fn c_process_info_by_name<T: OsGroup>(
    cont: &mut Container,
    name: CSliceRef<u8>,
    out: &mut MaybeUninit<ProcessInfo>,
) -> i32 {
    let name = unsafe { name.into_str() };
    unsafe { cont.instance_mut::<T>() }
        .process_info_by_name(name)
        .into_int_out_result(out)
}

extern "C" fn c_process_info_by_pid<T: OsGroup>(
    cont: &mut Container,
    pid: Pid,
    out: &mut MaybeUninit<ProcessInfo>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .process_info_by_pid(pid)
        .into_int_out_result(out)
}

extern "C" fn c_process_by_info<'r, 'a, T: OsGroup>(
    cont: &'r mut Container<'a>,
    info: ProcessInfo,
    out: &mut MaybeUninit<ProcessInstance<'r>>,
) -> i32 {
    let lib = cont.context().clone();
    unsafe { cont.instance_mut::<T>() }
        .process_by_info(info)
        .map(|proc| ProcessInstance::new(proc, lib))
        .into_int_out_result(out)
}

extern "C" fn c_into_process_by_info<T: OsGroup>(
    cont: Container<'static>,
    info: ProcessInfo,
    out: &mut MaybeUninit<IntoProcessInstance>,
) -> i32 {
    match unsafe { cont.into_inner::<T>() } {
        Some((os, lib)) => os
            .into_process_by_info(info)
            .map(|proc| IntoProcessInstance::new(proc, lib))
            .into_int_out_result(out),
        None => crate::plugins::borrowed_container_error().into_i32(),
    }
}

extern "C" fn c_module_address_list_callback<T: OsGroup>(
    cont: &mut Container,
    callback: AddressCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_address_list_callback(callback)
        .into_int_result()
}

extern "C" fn c_module_list_callback<T: OsGroup>(
    cont: &mut Container,
    callback: ModuleInfoCallback,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_list_callback(callback)
        .into_int_result()
}

extern "C" fn c_module_by_address<T: OsGroup>(
    cont: &mut Container,
    address: Address,
    out: &mut MaybeUninit<ModuleInfo>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .module_by_address(address)
        .into_int_out_result(out)
}

extern "C" fn c_module_by_name<T: OsGroup>(
    cont: &mut Container,
    name: CSliceRef<u8>,
    out: &mut MaybeUninit<ModuleInfo>,
) -> i32 {
    let name = unsafe { name.into_str() };
    unsafe { cont.instance_mut::<T>() }
        .module_by_name(name)
        .into_int_out_result(out)
}

extern "C" fn c_primary_module_address<T: OsGroup>(
    cont: &mut Container,
    out: &mut MaybeUninit<Address>,
) -> i32 {
    unsafe { cont.instance_mut::<T>() }
        .primary_module_address()
        .into_int_out_result(out)
}

extern "C" fn c_info<T: OsGroup>(cont: &Container) -> *const OsInfo {
    unsafe { cont.instance_ref::<T>() }.info() as *const _
}

/// Type erased OS layer.
///
/// Always implements [`Os`] and `Clone`. Physical memory, the kernel memory view and its virtual
/// address translation are optional and reachable through the `as_*` accessors. [`OsKeyboard`]
/// is optional as well, calling into it on an OS without keyboard access fails with
/// [`ErrorKind::UnsupportedOptionalFeature`].
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct OsInstance {
    clone: &'static CloneFunctionTable,
    os: &'static OsFunctionTable,
    phys: Option<&'static PhysicalMemoryFunctionTable>,
    memory_view: Option<&'static MemoryViewFunctionTable>,
    virt_translate: Option<&'static VirtualTranslateFunctionTable>,
    os_keyboard: Option<&'static OsKeyboardFunctionTable>,
    container: Container<'static>,
}

impl OsInstance {
    pub fn new<T: OsGroup>(instance: T, lib: LibArc) -> Self {
        Self {
            clone: CloneFunctionTable::of::<T>(),
            os: OsFunctionTable::of::<T>(),
            phys: instance.phys_mem_table(),
            memory_view: instance.memory_view_table(),
            virt_translate: instance.virt_translate_table(),
            os_keyboard: instance.os_keyboard_table(),
            container: Container::new(instance, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        (Capabilities::CLONE | Capabilities::OS)
            .with_opt(Capabilities::PHYSICAL_MEMORY, self.phys)
            .with_opt(Capabilities::MEMORY_VIEW, self.memory_view)
            .with_opt(Capabilities::VIRTUAL_TRANSLATE, self.virt_translate)
            .with_opt(Capabilities::OS_KEYBOARD, self.os_keyboard)
    }

    /// Library the OS was created by.
    pub fn library(&self) -> &LibArc {
        self.container.context()
    }

    /// Physical memory underneath the OS.
    pub fn as_phys_mem(&mut self) -> Option<impl PhysicalMemory + '_> {
        let table = self.phys?;
        Some(CapRef::new(table, &mut self.container))
    }

    /// Kernel address space of the OS.
    pub fn as_memory_view(&mut self) -> Option<impl MemoryView + '_> {
        let table = self.memory_view?;
        Some(CapRef::new(table, &mut self.container))
    }

    /// Address translation of the kernel address space.
    pub fn as_virt_translate(&mut self) -> Option<impl VirtualTranslate + '_> {
        let table = self.virt_translate?;
        Some(CapRef::new(table, &mut self.container))
    }

    fn no_keyboard() -> Error {
        Error(ErrorOrigin::OsLayer, ErrorKind::UnsupportedOptionalFeature)
    }
}

impl Clone for OsInstance {
    fn clone(&self) -> Self {
        Self {
            clone: self.clone,
            os: self.os,
            phys: self.phys,
            memory_view: self.memory_view,
            virt_translate: self.virt_translate,
            os_keyboard: self.os_keyboard,
            container: (self.clone.clone)(&self.container),
        }
    }
}

impl Os for OsInstance {
    type ProcessType<'a> = ProcessInstance<'a>;
    type IntoProcessType = IntoProcessInstance;

    fn process_address_list_callback(&mut self, callback: AddressCallback) -> Result<()> {
        result_from_int_void((self.os.process_address_list_callback)(
            &mut self.container,
            callback,
        ))
    }

    fn process_info_list_callback(&mut self, callback: ProcessInfoCallback) -> Result<()> {
        result_from_int_void((self.os.process_info_list_callback)(
            &mut self.container,
            callback,
        ))
    }

    fn process_info_by_address(&mut self, address: Address) -> Result<ProcessInfo> {
        let mut out = MaybeUninit::uninit();
        let res = (self.os.process_info_by_address)(&mut self.container, address, &mut out);
        result_from_int(res, out)
    }

    fn process_info_by_name(&mut self, name: &str) -> Result<ProcessInfo> {
        let mut out = MaybeUninit::uninit();
        let res = (self.os.process_info_by_name)(&mut self.container, name.into(), &mut out);
        result_from_int(res, out)
    }

    fn process_info_by_pid(&mut self, pid: Pid) -> Result<ProcessInfo> {
        let mut out = MaybeUninit::uninit();
        let res = (self.os.process_info_by_pid)(&mut self.container, pid, &mut out);
        result_from_int(res, out)
    }

    fn process_by_info(&mut self, info: ProcessInfo) -> Result<ProcessInstance<'_>> {
        let mut out = MaybeUninit::uninit();
        let res = (self.os.process_by_info)(&mut self.container, info, &mut out);
        result_from_int(res, out)
    }

    fn into_process_by_info(self, info: ProcessInfo) -> Result<IntoProcessInstance> {
        let mut out = MaybeUninit::uninit();
        let res = (self.os.into_process_by_info)(self.container, info, &mut out);
        result_from_int(res, out)
    }

    fn module_address_list_callback(&mut self, callback: AddressCallback) -> Result<()> {
        result_from_int_void((self.os.module_address_list_callback)(
            &mut self.container,
            callback,
        ))
    }

    fn module_list_callback(&mut self, callback: ModuleInfoCallback) -> Result<()> {
        result_from_int_void((self.os.module_list_callback)(
            &mut self.container,
            callback,
        ))
    }

    fn module_by_address(&mut self, address: Address) -> Result<ModuleInfo> {
        let mut out = MaybeUninit::uninit();
        let res = (self.os.module_by_address)(&mut self.container, address, &mut out);
        result_from_int(res, out)
    }

    fn module_by_name(&mut self, name: &str) -> Result<ModuleInfo> {
        let mut out = MaybeUninit::uninit();
        let res = (self.os.module_by_name)(&mut self.container, name.into(), &mut out);
        result_from_int(res, out)
    }

    fn primary_module_address(&mut self) -> Result<Address> {
        let mut out = MaybeUninit::uninit();
        let res = (self.os.primary_module_address)(&mut self.container, &mut out);
        result_from_int(res, out)
    }

    fn info(&self) -> &OsInfo {
        // the info lives inside the instance, which lives as long as the container
        unsafe { &*(self.os.info)(&self.container) }
    }
}

impl OsKeyboard for OsInstance {
    type KeyboardType<'a> = KeyboardInstance<'a>;
    type IntoKeyboardType = IntoKeyboardInstance;

    fn keyboard(&mut self) -> Result<KeyboardInstance<'_>> {
        let table = self.os_keyboard.ok_or_else(Self::no_keyboard)?;
        keyboard_from_table(table, &mut self.container)
    }

    fn into_keyboard(self) -> Result<IntoKeyboardInstance> {
        let table = self.os_keyboard.ok_or_else(Self::no_keyboard)?;
        into_keyboard_from_table(table, self.container)
    }
}

/// OS layers can be wrapped again. Keyboard access is carried along, the memory capabilities are
/// only reachable on the inner object.
impl OsGroup for OsInstance {
    fn os_keyboard_table(&self) -> Option<&'static OsKeyboardFunctionTable> {
        self.os_keyboard
            .map(|_| OsKeyboardFunctionTable::of::<Self>())
    }
}
