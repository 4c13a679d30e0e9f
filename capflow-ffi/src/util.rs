use std::ffi::CStr;
use std::os::raw::c_char;

use log::error;

pub fn inspect_err<E: std::fmt::Display>(e: E) -> E {
    error!("{}", e);
    e
}

pub fn to_heap<T>(a: T) -> &'static mut T {
    Box::leak(Box::new(a))
}

/// Converts a C string, treating a null pointer as an empty string.
///
/// # Safety
///
/// `s` has to be null or point to a valid null terminated string.
pub unsafe fn str_or_empty<'a>(s: *const c_char) -> std::borrow::Cow<'a, str> {
    if s.is_null() {
        "".into()
    } else {
        CStr::from_ptr(s).to_string_lossy()
    }
}

/// Zeroes out a handle whose contents were moved out.
///
/// # Safety
///
/// `handle` has to point to writable storage of `T`.
pub unsafe fn make_inert<T>(handle: *mut T) {
    std::ptr::write_bytes(handle, 0, 1);
}

/// Checks whether a handle was zeroed by [`make_inert`].
///
/// Every capability object starts with a function table reference, which is never null in a live
/// object.
///
/// # Safety
///
/// `handle` has to point to readable storage of `T`.
pub unsafe fn is_inert<T>(handle: *const T) -> bool {
    handle.is_null() || handle.cast::<*const u8>().read().is_null()
}
