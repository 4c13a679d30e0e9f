/*!
Connectors are the raw memory transports of capflow.

A connector implements [`PhysicalMemory`](crate::mem::PhysicalMemory) and optionally
[`ConnectorCpuState`]. Connectors are usually loaded from plugins through the
[`Inventory`](crate::plugins::Inventory) and handed to an OS layer.
*/

pub mod cpu_state;
#[doc(hidden)]
pub use cpu_state::{ConnectorCpuState, CpuState};
