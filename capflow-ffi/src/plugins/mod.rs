use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::raw::c_char;
use std::path::PathBuf;

use capflow::error::AsIntResult;
use capflow::plugins::{ConnectorInstance, Inventory, OsInstance};

use crate::util::*;

use log::trace;

/// Create a new plugin inventory
///
/// This function will try to find plugins using the PATH environment variable and a set of
/// standard directories.
///
/// Note that all functions go through each directory, and look for a `capflow` directory,
/// and search for libraries in those.
///
/// # Safety
///
/// Inventory is inherently unsafe, because it loads shared libraries which can not be
/// guaranteed to be safe.
#[no_mangle]
pub unsafe extern "C" fn inventory_scan() -> &'static mut Inventory {
    to_heap(Inventory::scan())
}

/// Create a new inventory with custom path string
///
/// Returns null if `path` is not a directory.
///
/// # Safety
///
/// `path` must be a valid null terminated string
#[no_mangle]
pub unsafe extern "C" fn inventory_scan_path(
    path: *const c_char,
) -> Option<&'static mut Inventory> {
    let rpath = CStr::from_ptr(path).to_string_lossy();
    Inventory::scan_path(rpath.to_string())
        .map_err(inspect_err)
        .ok()
        .map(to_heap)
}

/// Add a directory to an existing inventory
///
/// # Safety
///
/// `dir` must be a valid null terminated string
#[no_mangle]
pub unsafe extern "C" fn inventory_add_dir(inv: &mut Inventory, dir: *const c_char) -> i32 {
    let rdir = CStr::from_ptr(dir).to_string_lossy();

    inv.add_dir(PathBuf::from(rdir.to_string()))
        .map(|_| ())
        .map_err(inspect_err)
        .into_int_result()
}

/// Create a connector with given arguments
///
/// This creates an instance of `ConnectorInstance`.
///
/// This instance needs to be dropped using `connector_drop`.
///
/// # Arguments
///
/// * `name` - name of the connector to use
/// * `args` - arguments to be passed to the connector upon its creation, may be null
///
/// # Safety
///
/// `name` must be a valid null terminated string, `args` has to be either null or a valid null
/// terminated string.
///
/// Any error strings returned by the connector must not be outputed after the connector gets
/// freed, because that operation could cause the underlying shared library to get unloaded.
#[no_mangle]
pub unsafe extern "C" fn inventory_create_connector(
    inv: &mut Inventory,
    name: *const c_char,
    args: *const c_char,
    out: &mut MaybeUninit<ConnectorInstance>,
) -> i32 {
    let rname = CStr::from_ptr(name).to_string_lossy();
    let rargs = str_or_empty(args);

    inv.create_connector(&rname, &rargs)
        .map_err(inspect_err)
        .into_int_out_result(out)
}

/// Create a OS instance with given arguments
///
/// This creates an instance of `OsInstance`.
///
/// This instance needs to be freed using `os_drop`.
///
/// # Arguments
///
/// * `name` - name of the OS to use
/// * `args` - arguments to be passed to the OS upon its creation, may be null
/// * `mem` - a previously initialized connector instance, may be null
/// * `out` - a valid memory location that will contain the resulting os-instance
///
/// # Remarks
///
/// If the OS was created, the `mem` connector instance is being _moved_ into the os layer and
/// the handle is zeroed out. Calling `connector_drop` on it is still allowed and does nothing.
/// On failure `mem` is left untouched and still has to be dropped by the caller.
///
/// # Safety
///
/// `name` must be a valid null terminated string, `args` has to be either null or a valid null
/// terminated string. `mem` has to be null or point to a valid connector instance.
#[no_mangle]
pub unsafe extern "C" fn inventory_create_os(
    inv: &mut Inventory,
    name: *const c_char,
    args: *const c_char,
    mem: *mut ConnectorInstance,
    out: &mut MaybeUninit<OsInstance>,
) -> i32 {
    let rname = CStr::from_ptr(name).to_string_lossy();
    let rargs = str_or_empty(args);

    let mut mem_obj = if is_inert(mem) {
        None
    } else {
        Some(mem.read())
    };

    let res = inv.create_os(&rname, &rargs, &mut mem_obj);

    if !mem.is_null() {
        match mem_obj {
            Some(conn) => mem.write(conn),
            None => make_inert(mem),
        }
    }

    res.map_err(inspect_err).into_int_out_result(out)
}

/// Free a os plugin
///
/// # Safety
///
/// `os` must point to a valid `OsInstance` that was created using one of the provided
/// functions. There must be no process created from it that is still alive.
#[no_mangle]
pub unsafe extern "C" fn os_drop(os: *mut OsInstance) {
    trace!("os_drop: {:?}", os);
    if !is_inert(os) {
        std::ptr::drop_in_place(os);
        make_inert(os);
    }
}

/// Clone a connector
///
/// This method is useful when needing to perform multithreaded operations, as a connector is not
/// guaranteed to be thread safe. Every single cloned instance also needs to be dropped using
/// `connector_drop`.
///
/// # Safety
///
/// `conn` has to point to a valid `ConnectorInstance` created by one of the provided
/// functions.
#[no_mangle]
pub unsafe extern "C" fn connector_clone(
    conn: &ConnectorInstance,
    out: &mut MaybeUninit<ConnectorInstance>,
) {
    trace!("connector_clone: {:?}", conn as *const _);
    out.write(conn.clone());
}

/// Free a connector instance
///
/// Handles that were moved into an OS are zeroed out and ignored.
///
/// # Safety
///
/// `conn` has to point to a valid [`ConnectorInstance`] created by one of the provided
/// functions, or to a handle zeroed out by `inventory_create_os`.
#[no_mangle]
pub unsafe extern "C" fn connector_drop(conn: *mut ConnectorInstance) {
    trace!("connector_drop: {:?}", conn);
    if !is_inert(conn) {
        std::ptr::drop_in_place(conn);
        make_inert(conn);
    }
}

/// Free a plugin inventory
///
/// # Safety
///
/// `inv` must point to a valid `Inventory` that was created using one of the provided
/// functions.
#[no_mangle]
pub unsafe extern "C" fn inventory_free(inv: &'static mut Inventory) {
    trace!("inventory_free: {:?}", inv as *mut _);
    let _ = Box::from_raw(inv);
}
