//! Instances created through a loaded library context.
#![cfg(all(feature = "plugins", target_os = "linux"))]

use capflow::abi::CArc;
use capflow::dummy::CAPFLOW_CONNECTOR_DUMMY;
use capflow::plugins::{LibContext, LibInstance};
use capflow::prelude::v1::*;

use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

fn library() -> CArc<LibContext> {
    // the plugin logger of a loaded context forwards to the host logger
    let _ = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    let lib = unsafe { libloading::Library::new("libc.so.6") }.unwrap();
    CArc::from(LibContext::from(lib))
}

#[test]
fn instance_keeps_library() {
    let lib = library();
    assert!(!lib.is_builtin());

    let instance =
        LibInstance::new("libc.so.6".into(), lib.clone(), CAPFLOW_CONNECTOR_DUMMY).unwrap();
    assert_eq!(instance.name(), "dummy");
    assert!(instance.library().try_get_logger().is_none());

    let mut conn = instance.instantiate("size=8k", &mut None).unwrap();
    assert!(instance.library().try_get_logger().is_some());

    drop(instance);
    drop(lib);

    assert!(conn.library().is_some());
    conn.phys_write(0x1000.into(), &0xBEEFu16).unwrap();
    assert_eq!(conn.phys_read::<u16>(0x1000.into()).unwrap(), 0xBEEF);

    let mut clone = conn.clone();
    drop(conn);
    assert!(clone.library().is_some());
    assert_eq!(clone.phys_read::<u16>(0x1000.into()).unwrap(), 0xBEEF);
}

#[test]
fn builtin_instance_has_no_library() {
    let instance = LibInstance::builtin(CAPFLOW_CONNECTOR_DUMMY).unwrap();
    let conn = instance.instantiate("", &mut None).unwrap();
    assert!(instance.library().is_builtin());
    assert!(!conn.library().is_some());
}
