use std::cell::RefCell;

use capflow::dummy::DummyMemory;
use capflow::prelude::v1::*;

fn connector(size: umem) -> ConnectorInstance {
    ConnectorInstance::new(DummyMemory::new(size), LibArc::none())
}

#[test]
fn physical_batch_reports_in_order() {
    let mut conn = connector(size::kb(4));
    conn.phys_write(0x8.into(), &0x1122_3344_5566_7788u64).unwrap();

    let addrs = [0x0u64, 0x2000, 0x8, 0x3000, 0x10, 0xFFC];
    let mut bufs = vec![[0u8; 8]; addrs.len()];

    let log = RefCell::new(vec![]);
    {
        let ok = &mut |CTup2(meta, _): ReadData| {
            log.borrow_mut().push((true, meta));
            true
        };
        let fail = &mut |CTup2(meta, _): ReadData| {
            log.borrow_mut().push((false, meta));
            true
        };
        let mut ok: OpaqueCallback<_> = ok.into();
        let mut fail: OpaqueCallback<_> = fail.into();

        let inp = addrs.iter().zip(bufs.iter_mut()).map(|(&addr, buf)| {
            CTup3(
                PhysicalAddress::from(addr),
                Address::from(addr),
                CSliceMut::from(&mut buf[..]),
            )
        });

        let res = conn.phys_read_iter(inp, Some(&mut ok), Some(&mut fail));
        assert!(matches!(res, Err(PartialError::PartialVirtualRead(_))));
    }

    assert_eq!(
        log.into_inner(),
        addrs
            .iter()
            .map(|&a| (a < 0xFF8, Address::from(a)))
            .collect::<Vec<_>>()
    );
    assert_eq!(u64::from_le_bytes(bufs[2]), 0x1122_3344_5566_7788);
}

#[test]
fn full_success_is_not_partial() {
    let mut conn = connector(size::kb(4));
    let mut bufs = vec![[0u8; 4]; 3];
    let mut data = bufs
        .iter_mut()
        .enumerate()
        .map(|(i, buf)| {
            CTup3(
                PhysicalAddress::from(i as u64 * 4),
                Address::from(i as u64),
                CSliceMut::from(&mut buf[..]),
            )
        })
        .collect::<Vec<_>>();

    assert!(conn.phys_read_raw_list(&mut data).is_ok());
}

#[test]
fn view_batch_zeroes_failures() {
    let mut os = capflow::dummy::DummyOs::with_memory(size::mb(1), 1).unwrap();
    let mut proc = os.process_by_name("proc0.exe").unwrap();

    let mut inside = [0xAAu8; 4];
    let mut outside = [0xAAu8; 4];
    let mut data = [
        CTup2(Address::from(0x10000u64), CSliceMut::from(&mut inside[..])),
        CTup2(Address::from(0x10u64), CSliceMut::from(&mut outside[..])),
    ];

    assert!(matches!(
        proc.read_raw_list(&mut data),
        Err(PartialError::PartialVirtualRead(_))
    ));
    assert_eq!(u32::from_le_bytes(inside), 4);
    assert_eq!(outside, [0; 4]);
}

#[test]
fn write_batch_through_view() {
    let mut conn = connector(size::kb(8));
    let mut view = conn.phys_view();

    let payload = [1u8, 2, 3, 4];
    let data = [
        CTup2(Address::from(0x100u64), CSliceRef::from(&payload[..])),
        CTup2(Address::from(0x1FFEu64), CSliceRef::from(&payload[..])),
    ];
    assert!(view.write_raw_list(&data).is_err());
    assert_eq!(view.read::<[u8; 4]>(0x100.into()).data().unwrap(), payload);
}

#[test]
fn enumeration_stops_early() {
    let mut inventory = Inventory::new();
    inventory
        .add_os_descriptor(capflow::dummy::CAPFLOW_OS_DUMMY)
        .unwrap();
    let mut os = inventory
        .create_os("dummy", "procs=10,size=4m", &mut None)
        .unwrap();

    let mut seen = vec![];
    os.process_address_list_callback(
        (&mut |addr: Address| {
            seen.push(addr);
            seen.len() < 3
        })
            .into(),
    )
    .unwrap();
    assert_eq!(seen.len(), 3);

    assert_eq!(os.process_info_list().unwrap().len(), 10);
}
