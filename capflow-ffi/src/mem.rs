use std::slice::{from_raw_parts, from_raw_parts_mut};

use capflow::error::AsIntResult;
use capflow::mem::{PhysicalMemory, PhysicalMemoryMetadata, PhysicalReadData, PhysicalWriteData};
use capflow::plugins::ConnectorInstance;
use capflow::types::PhysicalAddress;

use crate::util::*;

/// Read a list of physical memory locations
///
/// Locations that could not be read are zeroed out. Returns a non-zero value if any of them
/// failed.
///
/// # Safety
///
/// `data` must point to `len` valid entries, each referencing writable memory.
#[no_mangle]
pub unsafe extern "C" fn connector_phys_read_raw_list(
    conn: &mut ConnectorInstance,
    data: *mut PhysicalReadData,
    len: usize,
) -> i32 {
    let data = from_raw_parts_mut(data, len);
    conn.phys_read_raw_list(data).into_int_result()
}

/// Write a list of physical memory locations
///
/// Returns a non-zero value if any of the locations could not be written.
///
/// # Safety
///
/// `data` must point to `len` valid entries.
#[no_mangle]
pub unsafe extern "C" fn connector_phys_write_raw_list(
    conn: &mut ConnectorInstance,
    data: *const PhysicalWriteData,
    len: usize,
) -> i32 {
    let data = from_raw_parts(data, len);
    conn.phys_write_raw_list(data).into_int_result()
}

/// Retrieve metadata about the physical memory of a connector
#[no_mangle]
pub extern "C" fn connector_phys_metadata(conn: &ConnectorInstance) -> PhysicalMemoryMetadata {
    conn.metadata()
}

/// Read a single range of physical memory
///
/// # Safety
///
/// `out` must point to at least `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn connector_phys_read_raw_into(
    conn: &mut ConnectorInstance,
    addr: PhysicalAddress,
    out: *mut u8,
    len: usize,
) -> i32 {
    conn.phys_read_raw_into(addr, from_raw_parts_mut(out, len))
        .map_err(inspect_err)
        .into_int_result()
}

/// Write a single range of physical memory
///
/// # Safety
///
/// `input` must point to at least `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn connector_phys_write_raw(
    conn: &mut ConnectorInstance,
    addr: PhysicalAddress,
    input: *const u8,
    len: usize,
) -> i32 {
    conn.phys_write_raw(addr, from_raw_parts(input, len))
        .map_err(inspect_err)
        .into_int_result()
}
