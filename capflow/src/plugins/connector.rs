//! Connector capability object and plugin glue.

use std::mem::MaybeUninit;

use log::error;

use super::args::ConnectorArgs;
use super::container::{Capabilities, CloneFunctionTable, Container, LibArc};
use super::cpu_state::{
    cpu_state_from_table, ConnectorCpuStateFunctionTable, CpuStateInstance, IntoCpuStateInstance,
};
use super::mem::{
    into_phys_view_from_table, phys_view_from_table, CapRef, MemoryViewInstance,
    PhysicalMemoryFunctionTable,
};
use super::os::OsInstance;
use super::{create_instance, Loadable, PluginDescriptor, PluginLogger};
use crate::abi::{COption, CSliceRef};
use crate::connector::ConnectorCpuState;
use crate::error::{result_from_int, Error, ErrorKind, ErrorOrigin, Result};
use crate::mem::{
    PhysicalMemory, PhysicalMemoryMapping, PhysicalMemoryMetadata, PhysicalReadMemOps,
    PhysicalWriteMemOps,
};

/// Everything a type needs to be wrapped into a [`ConnectorInstance`].
///
/// Backends with CPU state access return its function table:
///
/// ```ignore
/// impl ConnectorGroup for MyConnector {
///     fn cpu_state_table(&self) -> Option<&'static ConnectorCpuStateFunctionTable> {
///         Some(ConnectorCpuStateFunctionTable::of::<Self>())
///     }
/// }
/// ```
pub trait ConnectorGroup: PhysicalMemory + Clone + 'static {
    fn cpu_state_table(&self) -> Option<&'static ConnectorCpuStateFunctionTable> {
        None
    }
}

/// Type erased connector.
///
/// Always implements [`PhysicalMemory`] and `Clone`. [`ConnectorCpuState`] is optional, calling
/// into it on a connector without CPU state access fails with
/// [`ErrorKind::UnsupportedOptionalFeature`].
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct ConnectorInstance {
    clone: &'static CloneFunctionTable,
    phys: &'static PhysicalMemoryFunctionTable,
    cpu_state: Option<&'static ConnectorCpuStateFunctionTable>,
    container: Container<'static>,
}

impl ConnectorInstance {
    pub fn new<T: ConnectorGroup>(instance: T, lib: LibArc) -> Self {
        Self {
            clone: CloneFunctionTable::of::<T>(),
            phys: PhysicalMemoryFunctionTable::of::<T>(),
            cpu_state: instance.cpu_state_table(),
            container: Container::new(instance, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        (Capabilities::CLONE | Capabilities::PHYSICAL_MEMORY)
            .with_opt(Capabilities::CONNECTOR_CPU_STATE, self.cpu_state)
    }

    /// Library the connector was created by.
    pub fn library(&self) -> &LibArc {
        self.container.context()
    }

    /// Borrows the physical memory of the connector as a [`MemoryView`](crate::mem::MemoryView).
    pub fn memory_view(&mut self) -> MemoryViewInstance<'_> {
        phys_view_from_table(self.phys, &mut self.container)
    }

    /// Turns the connector into a [`MemoryView`](crate::mem::MemoryView) of its physical memory.
    ///
    /// The library reference moves into the view, the CPU state capability is lost.
    pub fn into_memory_view(self) -> Result<MemoryViewInstance<'static>> {
        into_phys_view_from_table(self.phys, self.container)
    }

    fn phys_ref(&mut self) -> CapRef<'_, 'static, PhysicalMemoryFunctionTable> {
        CapRef::new(self.phys, &mut self.container)
    }

    fn no_cpu_state() -> Error {
        Error(ErrorOrigin::Connector, ErrorKind::UnsupportedOptionalFeature)
    }
}

impl Clone for ConnectorInstance {
    fn clone(&self) -> Self {
        Self {
            clone: self.clone,
            phys: self.phys,
            cpu_state: self.cpu_state,
            container: (self.clone.clone)(&self.container),
        }
    }
}

impl PhysicalMemory for ConnectorInstance {
    fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()> {
        self.phys_ref().phys_read_raw_iter(data)
    }

    fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()> {
        self.phys_ref().phys_write_raw_iter(data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        (self.phys.metadata)(&self.container)
    }

    fn set_mem_map(&mut self, mem_map: &[PhysicalMemoryMapping]) {
        self.phys_ref().set_mem_map(mem_map)
    }
}

impl ConnectorCpuState for ConnectorInstance {
    type CpuStateType<'a> = CpuStateInstance<'a>;
    type IntoCpuStateType = IntoCpuStateInstance;

    fn cpu_state(&mut self) -> Result<CpuStateInstance<'_>> {
        let table = self.cpu_state.ok_or_else(Self::no_cpu_state)?;
        cpu_state_from_table(table, &mut self.container)
    }

    fn into_cpu_state(self) -> Result<IntoCpuStateInstance> {
        let table = self.cpu_state.ok_or_else(Self::no_cpu_state)?;
        let mut out = MaybeUninit::uninit();
        let res = (table.into_cpu_state)(self.container, &mut out);
        result_from_int(res, out)
    }
}

/// Connectors can be wrapped again, the optional CPU state is carried along.
impl ConnectorGroup for ConnectorInstance {
    fn cpu_state_table(&self) -> Option<&'static ConnectorCpuStateFunctionTable> {
        self.cpu_state
            .map(|_| ConnectorCpuStateFunctionTable::of::<Self>())
    }
}

pub type ConnectorDescriptor = PluginDescriptor<LoadableConnector>;

/// Connector plugins, optionally layered on top of an OS.
pub struct LoadableConnector;

impl Loadable for LoadableConnector {
    type Instance = ConnectorInstance;
    type Input = OsInstance;

    fn export_prefix() -> &'static str {
        "CAPFLOW_CONNECTOR_"
    }

    fn plugin_type() -> &'static str {
        "Connector"
    }

    fn origin() -> ErrorOrigin {
        ErrorOrigin::Connector
    }
}

/// Plugin side of a connector create function.
///
/// Parses the arguments, runs `create_fn` and writes the wrapped connector into `out`. The OS in
/// `input` stays in place unless `create_fn` takes it.
pub fn create_connector<T: ConnectorGroup>(
    args: CSliceRef<u8>,
    input: &mut COption<OsInstance>,
    lib: LibArc,
    logger: Option<&'static PluginLogger>,
    out: &mut MaybeUninit<ConnectorInstance>,
    create_fn: impl FnOnce(&ConnectorArgs, &mut Option<OsInstance>) -> Result<T>,
) -> i32 {
    create_instance(args, input, logger, out, |args, input| {
        create_fn(args, input)
            .map(|conn| ConnectorInstance::new(conn, lib))
            .map_err(|err| {
                error!("unable to create connector: {}", err);
                err
            })
    })
}
