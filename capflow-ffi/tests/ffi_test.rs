use std::ffi::CString;
use std::mem::MaybeUninit;
use std::ptr;

use capflow::dummy::{CAPFLOW_CONNECTOR_DUMMY, CAPFLOW_OS_DUMMY};
use capflow::prelude::v1::*;

use capflow_ffi::mem::*;
use capflow_ffi::os::*;
use capflow_ffi::plugins::*;
use capflow_ffi::util::is_inert;

fn inventory() -> &'static mut Inventory {
    let mut inventory = Inventory::new();
    inventory
        .add_connector_descriptor(CAPFLOW_CONNECTOR_DUMMY)
        .unwrap()
        .add_os_descriptor(CAPFLOW_OS_DUMMY)
        .unwrap();
    Box::leak(Box::new(inventory))
}

fn cstr(s: &str) -> CString {
    CString::new(s).unwrap()
}

#[test]
fn connector_lifecycle() {
    let inv = inventory();
    let name = cstr("dummy");
    let args = cstr("size=64k");

    unsafe {
        let mut conn = MaybeUninit::uninit();
        assert_eq!(
            inventory_create_connector(inv, name.as_ptr(), args.as_ptr(), &mut conn),
            0
        );
        let conn_ref = &mut *conn.as_mut_ptr();
        assert_eq!(conn_ref.metadata().real_size, 0x10000);

        let mut clone = MaybeUninit::uninit();
        connector_clone(conn_ref, &mut clone);
        (*clone.as_mut_ptr()).phys_write(0x10.into(), &7u32).unwrap();
        assert_eq!(conn_ref.phys_read::<u32>(0x10.into()).unwrap(), 7);

        connector_drop(clone.as_mut_ptr());
        connector_drop(conn.as_mut_ptr());
        assert!(is_inert(conn.as_ptr()));

        inventory_free(inv);
    }
}

#[test]
fn unknown_connector_fails() {
    let inv = inventory();
    let name = cstr("missing");

    unsafe {
        let mut conn = MaybeUninit::uninit();
        let res = inventory_create_connector(inv, name.as_ptr(), ptr::null(), &mut conn);
        assert_eq!(
            Error::from_i32(res),
            Error(ErrorOrigin::Inventory, ErrorKind::PluginNotFound)
        );
        inventory_free(inv);
    }
}

#[test]
fn os_takes_connector_on_success() {
    let inv = inventory();
    let conn_name = cstr("dummy");
    let conn_args = cstr("size=1m");
    let os_name = cstr("dummy");
    let os_args = cstr("procs=2");
    let proc_name = cstr("proc1.exe");

    unsafe {
        let mut conn = MaybeUninit::uninit();
        assert_eq!(
            inventory_create_connector(inv, conn_name.as_ptr(), conn_args.as_ptr(), &mut conn),
            0
        );

        let mut os = MaybeUninit::uninit();
        assert_eq!(
            inventory_create_os(
                inv,
                os_name.as_ptr(),
                os_args.as_ptr(),
                conn.as_mut_ptr(),
                &mut os
            ),
            0
        );
        assert!(is_inert(conn.as_ptr()));
        // dropping a moved handle does nothing
        connector_drop(conn.as_mut_ptr());

        let os = Box::into_raw(Box::new(os.assume_init()));

        let mut proc = MaybeUninit::uninit();
        assert_eq!(os_process_by_name(&mut *os, proc_name.as_ptr(), &mut proc), 0);

        let mut pid = [0u8; 4];
        assert_eq!(
            process_read_raw_into(
                &mut *proc.as_mut_ptr(),
                Address::from(0x10000u64),
                pid.as_mut_ptr(),
                pid.len()
            ),
            0
        );
        assert_eq!(u32::from_le_bytes(pid), 8);
        process_drop(proc.as_mut_ptr());

        os_drop(os);
        drop(Box::from_raw(os.cast::<MaybeUninit<OsInstance>>()));

        inventory_free(inv);
    }
}

#[test]
fn os_failure_keeps_connector() {
    let inv = inventory();
    let conn_name = cstr("dummy");
    let conn_args = cstr("size=16k");
    let os_name = cstr("dummy");
    let os_args = cstr("procs=64");

    unsafe {
        let mut conn = MaybeUninit::uninit();
        assert_eq!(
            inventory_create_connector(inv, conn_name.as_ptr(), conn_args.as_ptr(), &mut conn),
            0
        );

        let mut os = MaybeUninit::uninit();
        assert_ne!(
            inventory_create_os(
                inv,
                os_name.as_ptr(),
                os_args.as_ptr(),
                conn.as_mut_ptr(),
                &mut os
            ),
            0
        );
        assert!(!is_inert(conn.as_ptr()));

        assert_eq!((*conn.as_ptr()).metadata().real_size, 0x4000);
        connector_drop(conn.as_mut_ptr());

        inventory_free(inv);
    }
}

#[test]
fn scan_missing_path() {
    let path = cstr("/nonexistent/capflow/plugins");
    unsafe {
        assert!(inventory_scan_path(path.as_ptr()).is_none());

        let inv = inventory();
        assert_ne!(inventory_add_dir(inv, path.as_ptr()), 0);
        inventory_free(inv);
    }
}

fn create_connector(inv: &mut Inventory, args: &str) -> MaybeUninit<ConnectorInstance> {
    let name = cstr("dummy");
    let args = cstr(args);
    let mut conn = MaybeUninit::uninit();
    unsafe {
        assert_eq!(
            inventory_create_connector(inv, name.as_ptr(), args.as_ptr(), &mut conn),
            0
        );
    }
    conn
}

#[test]
fn connector_phys_lists() {
    let inv = inventory();
    let mut conn = create_connector(inv, "size=16k");

    unsafe {
        let conn_ref = &mut *conn.as_mut_ptr();
        let meta = connector_phys_metadata(conn_ref);
        assert_eq!(meta.real_size, 0x4000);
        assert_eq!(meta.max_address, Address::from(0x3fffu64));

        let (first, second) = ([1u8; 4], [2u8; 2]);
        let write = [
            CTup3(PhysicalAddress::from(0x100u64), Address::from(0x100u64), (&first[..]).into()),
            CTup3(PhysicalAddress::from(0x200u64), Address::from(0x200u64), (&second[..]).into()),
        ];
        assert_eq!(connector_phys_write_raw_list(conn_ref, write.as_ptr(), write.len()), 0);

        let out_of_range = [
            CTup3(PhysicalAddress::from(0x300u64), Address::from(0x300u64), (&first[..]).into()),
            CTup3(PhysicalAddress::from(0x8000u64), Address::from(0x8000u64), (&first[..]).into()),
        ];
        assert_eq!(
            connector_phys_write_raw_list(conn_ref, out_of_range.as_ptr(), out_of_range.len()),
            -3
        );

        let (mut a, mut b, mut c) = ([0u8; 4], [0u8; 2], [0xffu8; 4]);
        let mut read = [
            CTup3(PhysicalAddress::from(0x100u64), Address::from(0x100u64), (&mut a[..]).into()),
            CTup3(PhysicalAddress::from(0x200u64), Address::from(0x200u64), (&mut b[..]).into()),
            CTup3(PhysicalAddress::from(0x9000u64), Address::from(0x9000u64), (&mut c[..]).into()),
        ];
        assert_eq!(connector_phys_read_raw_list(conn_ref, read.as_mut_ptr(), read.len()), -2);
        drop(read);

        assert_eq!(a, [1; 4]);
        assert_eq!(b, [2; 2]);
        // failed entries are zero filled
        assert_eq!(c, [0; 4]);

        let value = 0xDEADu16.to_le_bytes();
        assert_eq!(
            connector_phys_write_raw(conn_ref, 0x300u64.into(), value.as_ptr(), value.len()),
            0
        );
        let mut back = [0u8; 2];
        assert_eq!(
            connector_phys_read_raw_into(conn_ref, 0x300u64.into(), back.as_mut_ptr(), back.len()),
            0
        );
        assert_eq!(back, value);
        assert_ne!(
            connector_phys_read_raw_into(conn_ref, 0x4000u64.into(), back.as_mut_ptr(), back.len()),
            0
        );

        connector_drop(conn.as_mut_ptr());
        inventory_free(inv);
    }
}

extern "C" fn collect_pids(pids: &mut Vec<Pid>, info: ProcessInfo) -> bool {
    pids.push(info.pid);
    pids.len() < 3
}

extern "C" fn collect_modules(names: &mut Vec<String>, info: ModuleInfo) -> bool {
    names.push(info.name.to_string());
    true
}

#[test]
fn os_callbacks() {
    let inv = inventory();
    let mut conn = create_connector(inv, "size=1m");
    let os_name = cstr("dummy");
    let os_args = cstr("procs=4");

    unsafe {
        let mut os = MaybeUninit::uninit();
        assert_eq!(
            inventory_create_os(
                inv,
                os_name.as_ptr(),
                os_args.as_ptr(),
                conn.as_mut_ptr(),
                &mut os
            ),
            0
        );
        let os = Box::into_raw(Box::new(os.assume_init()));

        let mut pids = vec![];
        assert_eq!(
            os_process_info_list_callback(&mut *os, Callback::new(&mut pids, collect_pids).into()),
            0
        );
        // the callback stops the walk after three entries
        assert_eq!(pids, vec![4, 8, 12]);

        let mut proc = MaybeUninit::uninit();
        assert_eq!(os_process_by_pid(&mut *os, 12, &mut proc), 0);
        assert_eq!((*proc.as_ptr()).info().name.as_ref(), "proc2.exe");

        let mut names = vec![];
        assert_eq!(
            process_module_list_callback(
                &mut *proc.as_mut_ptr(),
                None,
                Callback::new(&mut names, collect_modules).into()
            ),
            0
        );
        assert_eq!(names, vec!["proc2.exe".to_string(), "libdummy.so".to_string()]);
        process_drop(proc.as_mut_ptr());

        let mut missing = MaybeUninit::uninit();
        assert_eq!(
            Error::from_i32(os_process_by_pid(&mut *os, 1000, &mut missing)),
            Error(ErrorOrigin::OsLayer, ErrorKind::ProcessNotFound)
        );

        os_drop(os);
        drop(Box::from_raw(os.cast::<MaybeUninit<OsInstance>>()));

        inventory_free(inv);
    }
}
