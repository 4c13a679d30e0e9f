use capflow::dummy::{CAPFLOW_CONNECTOR_DUMMY, CAPFLOW_OS_DUMMY};
use capflow::prelude::v1::*;

use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

fn init_log() {
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

fn inventory() -> Inventory {
    init_log();
    let mut inventory = Inventory::new();
    inventory
        .add_connector_descriptor(CAPFLOW_CONNECTOR_DUMMY)
        .unwrap()
        .add_os_descriptor(CAPFLOW_OS_DUMMY)
        .unwrap();
    inventory
}

#[test]
fn inventories_are_isolated() {
    let first = inventory();
    let second = Inventory::new();

    assert_eq!(first.available_connectors(), vec!["dummy".to_string()]);
    assert_eq!(first.available_os(), vec!["dummy".to_string()]);
    assert!(second.available_connectors().is_empty());

    assert_eq!(
        second.create_connector("dummy", "").err(),
        Some(Error(ErrorOrigin::Inventory, ErrorKind::PluginNotFound))
    );
}

#[test]
fn instances_are_independent() {
    let inventory = inventory();
    let mut small = inventory.create_connector("dummy", "size=8k").unwrap();
    let mut large = inventory.create_connector("dummy", "16k").unwrap();

    assert_eq!(small.metadata().real_size, 0x2000);
    assert_eq!(large.metadata().real_size, 0x4000);

    small.phys_write(0x20.into(), &0xAAu8).unwrap();
    assert_eq!(large.phys_read::<u8>(0x20.into()).unwrap(), 0);

    drop(small);
    large.phys_write(0x3000.into(), &0x55u8).unwrap();
    assert_eq!(large.phys_read::<u8>(0x3000.into()).unwrap(), 0x55);

    assert!(inventory.create_connector("missing", "").is_err());
    assert!(inventory.create_connector("dummy", "").is_ok());
}

#[test]
fn duplicate_descriptor() {
    let mut inventory = inventory();
    assert_eq!(
        inventory
            .add_connector_descriptor(CAPFLOW_CONNECTOR_DUMMY)
            .err(),
        Some(Error(ErrorOrigin::Inventory, ErrorKind::AlreadyExists))
    );

    let mut desc = CAPFLOW_OS_DUMMY;
    desc.plugin_version += 1;
    assert_eq!(
        Inventory::new().add_os_descriptor(desc).err(),
        Some(Error(ErrorOrigin::Inventory, ErrorKind::VersionMismatch))
    );
}

#[test]
fn unknown_plugin() {
    let inventory = inventory();
    assert_eq!(
        inventory.create_os("win32", "", &mut None).err(),
        Some(Error(ErrorOrigin::Inventory, ErrorKind::PluginNotFound))
    );
    assert!(inventory.connector_help("kvm").is_err());
}

#[test]
fn help_text() {
    let inventory = inventory();
    assert!(inventory.connector_help("dummy").unwrap().contains("size"));
    assert!(inventory.os_help("dummy").unwrap().contains("procs"));
    assert!(inventory.connector_target_list("dummy").unwrap().is_empty());
}

#[test]
fn failed_os_keeps_connector() {
    let inventory = inventory();

    let mut conn = Some(inventory.create_connector("dummy", "size=16k").unwrap());
    assert!(inventory.create_os("dummy", "procs=64", &mut conn).is_err());
    let mut conn = conn.expect("connector was consumed by a failed os");

    conn.phys_write(0x40.into(), &0x1234u16).unwrap();
    assert_eq!(conn.phys_read::<u16>(0x40.into()).unwrap(), 0x1234);

    let mut conn = Some(conn);
    let mut os = inventory.create_os("dummy", "procs=1", &mut conn).unwrap();
    assert!(conn.is_none());
    assert_eq!(os.process_info_list().unwrap().len(), 1);
}

#[test]
fn invalid_arguments() {
    let inventory = inventory();
    assert_eq!(
        inventory.create_os("dummy", "procs=many", &mut None).err(),
        Some(Error(ErrorOrigin::OsLayer, ErrorKind::ArgValidation))
    );
    assert_eq!(
        inventory.create_connector("dummy", "size=lots").err(),
        Some(Error(ErrorOrigin::Connector, ErrorKind::InvalidMemorySize))
    );
}

#[test]
fn builder_chain() {
    let inventory = inventory();

    let mut os = inventory
        .builder()
        .connector("dummy")
        .args("size=1m".parse().unwrap())
        .os("dummy")
        .args("procs=4".parse().unwrap())
        .build()
        .unwrap();
    assert_eq!(os.process_info_list().unwrap().len(), 4);

    let mut proc = os.process_by_pid(16).unwrap();
    assert_eq!(proc.read::<u32>(0x10000.into()).unwrap(), 16);

    assert!(inventory
        .builder()
        .connector("dummy")
        .os("missing")
        .build()
        .is_err());
}

#[test]
fn log_level_is_forwarded() {
    let inventory = inventory();
    inventory.set_max_log_level(LevelFilter::Warn);
    assert_eq!(log::max_level(), LevelFilter::Warn);
    inventory.set_max_log_level(LevelFilter::Debug);
}

#[cfg(feature = "plugins")]
mod loading {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("capflow-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_directory() {
        let dir = std::env::temp_dir().join("capflow-does-not-exist");
        assert_eq!(
            Inventory::scan_path(&dir).err(),
            Some(Error(ErrorOrigin::Inventory, ErrorKind::InvalidPath))
        );
    }

    #[test]
    fn corrupt_library_is_skipped() {
        let dir = temp_dir("corrupt");
        fs::write(dir.join("libcorrupt.so"), b"definitely not an elf file").unwrap();
        fs::write(dir.join("readme.txt"), b"hello").unwrap();

        let mut inventory = Inventory::scan_path(&dir).unwrap();
        assert!(inventory.available_connectors().is_empty());
        assert!(inventory.available_os().is_empty());

        inventory
            .add_connector_descriptor(CAPFLOW_CONNECTOR_DUMMY)
            .unwrap()
            .add_dir_filtered(dir.clone(), "corrupt")
            .unwrap();
        assert_eq!(inventory.available_connectors(), vec!["dummy".to_string()]);

        fs::remove_dir_all(dir).ok();
    }
}
