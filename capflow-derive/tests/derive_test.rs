use capflow::dummy::{DummyMemory, DummyOs};
use capflow::prelude::v1::*;

mod conn {
    use super::*;

    fn help() -> String {
        "test connector".to_string()
    }

    fn target_list() -> Result<Vec<TargetInfo>> {
        Ok(vec![
            TargetInfo {
                name: "first".into(),
            },
            TargetInfo {
                name: "second".into(),
            },
        ])
    }

    #[connector(
        name = "testconn",
        version = "1.2.3",
        description = "connector for the derive tests",
        help_fn = "help",
        target_list_fn = "target_list"
    )]
    pub fn create_connector(args: &ConnectorArgs) -> Result<DummyMemory> {
        Ok(DummyMemory::new(size::parse_size(args.get_default().unwrap_or("64k"))?))
    }
}

mod os {
    use super::*;

    #[os_layer(name = "testos")]
    pub fn create_os(_args: &OsArgs, connector: &mut Option<ConnectorInstance>) -> Result<DummyOs> {
        let mem = connector
            .take()
            .ok_or(Error(ErrorOrigin::OsLayer, ErrorKind::Configuration))?;
        DummyOs::new(mem, 2)
    }
}

mod standalone {
    use super::*;

    #[os_layer(name = "standalone", accept_input = false)]
    pub fn create_os(_args: &OsArgs) -> Result<DummyOs> {
        DummyOs::with_memory(size::kb(64), 1)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
struct Header {
    magic: u32,
    flags: u32,
    entry: u64,
}

fn inventory() -> Inventory {
    let mut inventory = Inventory::new();
    inventory
        .add_connector_descriptor(conn::CAPFLOW_CONNECTOR_TESTCONN)
        .unwrap()
        .add_os_descriptor(os::CAPFLOW_OS_TESTOS)
        .unwrap()
        .add_os_descriptor(standalone::CAPFLOW_OS_STANDALONE)
        .unwrap();
    inventory
}

#[test]
fn descriptor_fields() {
    let desc = conn::CAPFLOW_CONNECTOR_TESTCONN;
    assert_eq!(desc.plugin_version, CAPFLOW_PLUGIN_VERSION);
    assert!(!desc.accept_input);
    assert_eq!(desc.name.to_str(), Some("testconn"));
    assert_eq!(desc.version.to_str(), Some("1.2.3"));
    assert!(desc.help_callback.is_some());
    assert!(desc.target_list_callback.is_some());

    let desc = os::CAPFLOW_OS_TESTOS;
    assert!(desc.accept_input);
    assert!(desc.help_callback.is_none());
    assert!(desc.target_list_callback.is_none());
    assert_eq!(desc.version.to_str(), Some(env!("CARGO_PKG_VERSION")));

    assert!(!standalone::CAPFLOW_OS_STANDALONE.accept_input);
}

#[test]
fn help_and_targets() {
    let inventory = inventory();
    assert_eq!(inventory.connector_help("testconn").unwrap(), "test connector");

    let targets = inventory.connector_target_list("testconn").unwrap();
    assert_eq!(
        targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        vec!["first", "second"]
    );

    assert!(inventory.os_help("testos").is_err());
}

#[test]
fn create_through_shims() {
    let inventory = inventory();

    let mut conn = inventory.create_connector("testconn", "8k").unwrap();
    assert_eq!(conn.metadata().real_size, size::kb(8));

    let header = Header {
        magic: 0xCAFE_BABE,
        flags: 1,
        entry: 0x1000,
    };
    conn.phys_write(0x100.into(), &header).unwrap();
    let read = conn.phys_read::<Header>(0x100.into()).unwrap();
    assert_eq!((read.magic, read.flags, read.entry), (0xCAFE_BABE, 1, 0x1000));

    let mut conn = Some(conn);
    let mut os = inventory.create_os("testos", "", &mut conn).unwrap();
    assert!(conn.is_none());
    assert_eq!(os.process_info_list().unwrap().len(), 2);

    let mut standalone = inventory.create_os("standalone", "", &mut None).unwrap();
    assert_eq!(standalone.process_info_list().unwrap().len(), 1);
}

#[test]
fn failed_create_keeps_input() {
    let inventory = inventory();

    let err = inventory.create_connector("testconn", "lots").err().unwrap();
    assert_eq!(err.1, ErrorKind::InvalidMemorySize);

    assert_eq!(
        inventory.create_os("testos", "", &mut None).err(),
        Some(Error(ErrorOrigin::OsLayer, ErrorKind::Configuration))
    );
}
