//! Describes optional cpu state for a connector

use crate::error::Result;

/// CPU state access of a connector.
pub trait ConnectorCpuState: Send {
    /// CPU state borrowing the connector.
    type CpuStateType<'a>: CpuState + 'a
    where
        Self: 'a;
    /// CPU state that took over the resources of the connector.
    type IntoCpuStateType: CpuState + Clone + 'static;

    fn cpu_state(&mut self) -> Result<Self::CpuStateType<'_>>;

    fn into_cpu_state(self) -> Result<Self::IntoCpuStateType>
    where
        Self: Sized;
}

pub trait CpuState: Send {
    // TODO: register access and single stepping once a backend can provide them
    fn pause(&mut self);
    fn resume(&mut self);
}
