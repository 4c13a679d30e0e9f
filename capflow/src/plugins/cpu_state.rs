//! Function tables and capability objects of the connector CPU state.

use std::mem::MaybeUninit;

use super::container::{Capabilities, CloneFunctionTable, Container, LibArc};
use crate::connector::{ConnectorCpuState, CpuState};
use crate::error::{result_from_int, AsIntResult};

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct CpuStateFunctionTable {
    pub pause: extern "C" fn(cont: &mut Container),
    pub resume: extern "C" fn(cont: &mut Container),
}

impl CpuStateFunctionTable {
    pub fn of<T: CpuState>() -> &'static Self {
        &Self {
            pause: c_pause::<T>,
            resume: c_resume::<T>,
        }
    }
}

extern "C" fn c_pause<T: CpuState>(cont: &mut Container) {
    unsafe { cont.instance_mut::<T>() }.pause()
}

extern "C" fn c_resume<T: CpuState>(cont: &mut Container) {
    unsafe { cont.instance_mut::<T>() }.resume()
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct ConnectorCpuStateFunctionTable {
    pub cpu_state: for<'r, 'a> extern "C" fn(
        cont: &'r mut Container<'a>,
        out: &mut MaybeUninit<CpuStateInstance<'r>>,
    ) -> i32,
    pub into_cpu_state:
        extern "C" fn(cont: Container<'static>, out: &mut MaybeUninit<IntoCpuStateInstance>) -> i32,
}

impl ConnectorCpuStateFunctionTable {
    pub fn of<T: ConnectorCpuState + 'static>() -> &'static Self {
        &Self {
            cpu_state: c_cpu_state::<T>,
            into_cpu_state: c_into_cpu_state::<T>,
        }
    }
}

extern "C" fn c_cpu_state<'r, 'a, T: ConnectorCpuState + 'static>(
    cont: &'r mut Container<'a>,
    out: &mut MaybeUninit<CpuStateInstance<'r>>,
) -> i32 {
    let lib = cont.context().clone();
    unsafe { cont.instance_mut::<T>() }
        .cpu_state()
        .map(|state| CpuStateInstance::new(state, lib))
        .into_int_out_result(out)
}

extern "C" fn c_into_cpu_state<T: ConnectorCpuState + 'static>(
    cont: Container<'static>,
    out: &mut MaybeUninit<IntoCpuStateInstance>,
) -> i32 {
    match unsafe { cont.into_inner::<T>() } {
        Some((conn, lib)) => conn
            .into_cpu_state()
            .map(|state| IntoCpuStateInstance::new(state, lib))
            .into_int_out_result(out),
        None => super::borrowed_container_error().into_i32(),
    }
}

/// CPU state borrowing a connector.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct CpuStateInstance<'a> {
    cpu_state: &'static CpuStateFunctionTable,
    container: Container<'a>,
}

impl<'a> CpuStateInstance<'a> {
    pub fn new<T: CpuState + 'a>(state: T, lib: LibArc) -> Self {
        Self {
            cpu_state: CpuStateFunctionTable::of::<T>(),
            container: Container::new(state, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::CPU_STATE
    }
}

/// CPU state that took over a connector.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct IntoCpuStateInstance {
    clone: &'static CloneFunctionTable,
    cpu_state: &'static CpuStateFunctionTable,
    container: Container<'static>,
}

impl IntoCpuStateInstance {
    pub fn new<T: CpuState + Clone + 'static>(state: T, lib: LibArc) -> Self {
        Self {
            clone: CloneFunctionTable::of::<T>(),
            cpu_state: CpuStateFunctionTable::of::<T>(),
            container: Container::new(state, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::CLONE | Capabilities::CPU_STATE
    }
}

impl Clone for IntoCpuStateInstance {
    fn clone(&self) -> Self {
        Self {
            clone: self.clone,
            cpu_state: self.cpu_state,
            container: (self.clone.clone)(&self.container),
        }
    }
}

macro_rules! impl_cpu_state {
    ($ty:ty) => {
        impl CpuState for $ty {
            fn pause(&mut self) {
                (self.cpu_state.pause)(&mut self.container)
            }

            fn resume(&mut self) {
                (self.cpu_state.resume)(&mut self.container)
            }
        }
    };
}

impl_cpu_state!(CpuStateInstance<'_>);
impl_cpu_state!(IntoCpuStateInstance);

/// Reads the output of a `cpu_state` table entry.
pub(crate) fn cpu_state_from_table<'r>(
    table: &ConnectorCpuStateFunctionTable,
    cont: &'r mut Container,
) -> crate::error::Result<CpuStateInstance<'r>> {
    let mut out = MaybeUninit::uninit();
    let res = (table.cpu_state)(cont, &mut out);
    result_from_int(res, out)
}
