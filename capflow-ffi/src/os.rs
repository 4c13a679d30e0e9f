use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::raw::c_char;
use std::slice::from_raw_parts_mut;

use capflow::architecture::ArchitectureIdent;
use capflow::error::AsIntResult;
use capflow::mem::MemoryView;
use capflow::os::{ModuleInfoCallback, Os, Pid, Process, ProcessInfoCallback};
use capflow::plugins::{OsInstance, ProcessInstance};
use capflow::types::Address;

use crate::util::*;

use log::trace;

/// Open a process by its name
///
/// The process borrows the OS and needs to be freed using `process_drop` before the OS is
/// dropped or used for anything else.
///
/// # Safety
///
/// `name` must be a valid null terminated string. `os` has to outlive the process.
#[no_mangle]
pub unsafe extern "C" fn os_process_by_name(
    os: &'static mut OsInstance,
    name: *const c_char,
    out: &mut MaybeUninit<ProcessInstance<'static>>,
) -> i32 {
    let rname = CStr::from_ptr(name).to_string_lossy();

    os.process_by_name(&rname)
        .map_err(inspect_err)
        .into_int_out_result(out)
}

/// Open a process by its process identifier
///
/// The process borrows the OS and needs to be freed using `process_drop` before the OS is
/// dropped or used for anything else.
///
/// # Safety
///
/// `os` has to outlive the process.
#[no_mangle]
pub unsafe extern "C" fn os_process_by_pid(
    os: &'static mut OsInstance,
    pid: Pid,
    out: &mut MaybeUninit<ProcessInstance<'static>>,
) -> i32 {
    os.process_by_pid(pid)
        .map_err(inspect_err)
        .into_int_out_result(out)
}

/// Walk the processes of the OS
///
/// `callback` receives every process info until it returns `false`.
#[no_mangle]
pub extern "C" fn os_process_info_list_callback(
    os: &mut OsInstance,
    callback: ProcessInfoCallback,
) -> i32 {
    os.process_info_list_callback(callback)
        .map_err(inspect_err)
        .into_int_result()
}

/// Walk the modules of a process
///
/// `target_arch` may be null to walk the modules of every architecture in the process.
/// `callback` receives every module info until it returns `false`.
#[no_mangle]
pub extern "C" fn process_module_list_callback(
    process: &mut ProcessInstance<'static>,
    target_arch: Option<&ArchitectureIdent>,
    callback: ModuleInfoCallback,
) -> i32 {
    process
        .module_list_callback(target_arch, callback)
        .map_err(inspect_err)
        .into_int_result()
}

/// Read memory of a process
///
/// Returns a non-zero value if any part of the range could not be read, in which case the
/// unreadable bytes are zeroed.
///
/// # Safety
///
/// `out` must point to at least `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn process_read_raw_into(
    process: &mut ProcessInstance<'static>,
    addr: Address,
    out: *mut u8,
    len: usize,
) -> i32 {
    let out = from_raw_parts_mut(out, len);
    process.read_raw_into(addr, out).into_int_result()
}

/// Free a process
///
/// # Safety
///
/// `process` must point to a valid `ProcessInstance` that was created using one of the provided
/// functions.
#[no_mangle]
pub unsafe extern "C" fn process_drop(process: *mut ProcessInstance<'static>) {
    trace!("process_drop: {:?}", process);
    if !is_inert(process) {
        std::ptr::drop_in_place(process);
        make_inert(process);
    }
}
