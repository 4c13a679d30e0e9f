use capflow::dummy::{DummyMemory, DummyOs};
use capflow::prelude::v1::*;

/// Connector without CPU state access.
#[derive(Clone)]
struct Plain(DummyMemory);

impl PhysicalMemory for Plain {
    fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()> {
        self.0.phys_read_raw_iter(data)
    }

    fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()> {
        self.0.phys_write_raw_iter(data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        self.0.metadata()
    }
}

impl ConnectorGroup for Plain {}

fn dummy_os(procs: usize) -> OsInstance {
    let os = DummyOs::with_memory(size::mb(1), procs).unwrap();
    OsInstance::new(os, LibArc::none())
}

#[test]
fn connector_cpu_state() {
    let mem = DummyMemory::new(size::kb(64));
    let mut conn = ConnectorInstance::new(mem.clone(), LibArc::none());

    assert_eq!(
        conn.capabilities(),
        Capabilities::CLONE | Capabilities::PHYSICAL_MEMORY | Capabilities::CONNECTOR_CPU_STATE
    );

    {
        let mut state = conn.cpu_state().unwrap();
        state.pause();
        assert!(mem.is_paused());
        state.resume();
        assert!(!mem.is_paused());
    }

    let mut owned = conn.into_cpu_state().unwrap();
    owned.pause();
    assert!(mem.is_paused());
}

#[test]
fn missing_cpu_state() {
    let mut conn = ConnectorInstance::new(Plain(DummyMemory::new(size::kb(4))), LibArc::none());

    assert!(!conn.capabilities().contains(Capabilities::CONNECTOR_CPU_STATE));
    assert_eq!(
        conn.cpu_state().err(),
        Some(Error(
            ErrorOrigin::Connector,
            ErrorKind::UnsupportedOptionalFeature
        ))
    );

    conn.phys_write(0x10.into(), &5u8).unwrap();
    assert_eq!(conn.phys_read::<u8>(0x10.into()).unwrap(), 5);
}

#[test]
fn connector_memory_view() {
    let mem = DummyMemory::new(size::kb(16));
    let mut conn = ConnectorInstance::new(mem.clone(), LibArc::none());

    {
        let mut view = conn.memory_view();
        assert_eq!(view.capabilities(), Capabilities::MEMORY_VIEW);
        view.write(Address::from(0x2000u64), &0xCAFEu16).unwrap();
        assert_eq!(
            view.read::<u16>(Address::from(0x8000u64)).err(),
            Some(PartialError::PartialVirtualRead(0))
        );
    }
    assert_eq!(conn.phys_read::<u16>(0x2000.into()).unwrap(), 0xCAFE);

    let handles = mem.handle_count();
    let mut view = conn.into_memory_view().unwrap();
    assert_eq!(mem.handle_count(), handles);
    assert_eq!(view.read::<u16>(Address::from(0x2000u64)).unwrap(), 0xCAFE);
    assert_eq!(view.metadata().real_size, size::kb(16) as u64);

    drop(view);
    assert_eq!(mem.handle_count(), handles - 1);
}

#[test]
fn handles_are_counted() {
    let mem = DummyMemory::new(size::kb(4));
    let conn = ConnectorInstance::new(mem.clone(), LibArc::none());
    assert_eq!(mem.handle_count(), 2);

    let clone = conn.clone();
    assert_eq!(mem.handle_count(), 3);

    drop(conn);
    assert_eq!(mem.handle_count(), 2);
    drop(clone);
    assert_eq!(mem.handle_count(), 1);
}

#[test]
fn os_capabilities() {
    let mut os = dummy_os(2);

    assert_eq!(
        os.capabilities(),
        Capabilities::CLONE
            | Capabilities::OS
            | Capabilities::PHYSICAL_MEMORY
            | Capabilities::MEMORY_VIEW
            | Capabilities::VIRTUAL_TRANSLATE
            | Capabilities::OS_KEYBOARD
    );

    let kernel = Address::from(0xFFFF_8000_0000_1100u64);
    let pid = os.as_memory_view().unwrap().read::<u32>(kernel).unwrap();
    assert_eq!(pid, 8);

    let phys = os.as_virt_translate().unwrap().virt_to_phys(kernel).unwrap();
    assert_eq!(phys.address(), Address::from(0x1100u64));
    assert_eq!(
        os.as_phys_mem()
            .unwrap()
            .phys_read::<u32>(phys)
            .unwrap(),
        8
    );

    assert_eq!(os.info().arch, ArchitectureIdent::X86(64, false));
}

#[test]
fn os_keyboard() {
    let mut os = dummy_os(1);

    let mut kbd = os.keyboard().unwrap();
    assert!(kbd.capabilities().contains(Capabilities::KEYBOARD));
    kbd.set_down(0x20, true);
    drop(kbd);

    let mut owned = os.clone().into_keyboard().unwrap();
    assert!(owned.is_down(0x20));

    let state = owned.state().unwrap();
    assert!(state.capabilities().contains(Capabilities::KEYBOARD_STATE));
    owned.set_down(0x20, false);
    assert!(state.is_down(0x20));
    assert!(!os.keyboard().unwrap().is_down(0x20));
}

#[test]
fn process_instances() {
    let mut os = dummy_os(3);

    {
        let mut proc = os.process_by_name("proc1.exe").unwrap();
        assert_eq!(
            proc.capabilities(),
            Capabilities::PROCESS | Capabilities::MEMORY_VIEW | Capabilities::VIRTUAL_TRANSLATE
        );
        assert_eq!(proc.info().pid, 8);
        assert_eq!(proc.read::<u32>(0x10000.into()).unwrap(), 8);

        let phys = proc
            .as_virt_translate()
            .unwrap()
            .virt_to_phys(0x10000.into())
            .unwrap();
        assert!(phys.address() > Address::from(0u64));
    }

    let mut owned = os.clone().into_process_by_name("proc2.exe").unwrap();
    assert!(owned.capabilities().contains(Capabilities::CLONE));

    let mut clone = owned.clone();
    drop(owned);
    assert_eq!(clone.read::<u32>(0x10000.into()).unwrap(), 12);

    assert_eq!(
        os.process_by_name("proc9.exe").err().map(|e| e.1),
        Some(ErrorKind::ProcessNotFound)
    );
}

#[test]
fn rewrapped_os() {
    let mut inner = dummy_os(2);
    let expected = inner.process_info_list().unwrap();

    let mut outer = OsInstance::new(inner, LibArc::none());
    assert_eq!(
        outer.capabilities(),
        Capabilities::CLONE | Capabilities::OS | Capabilities::OS_KEYBOARD
    );
    assert!(outer.as_memory_view().is_none());

    assert_eq!(outer.process_info_list().unwrap(), expected);

    let mut proc = outer.process_by_pid(4).unwrap();
    assert_eq!(proc.read::<u32>(0x10000.into()).unwrap(), 4);
    assert!(proc.as_virt_translate().is_none());
}
