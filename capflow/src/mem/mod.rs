/*!
Memory access capabilities.

[`PhysicalMemory`] is what connectors provide, [`MemoryView`] is the generic address-space view
(process virtual memory, or physical memory projected through [`PhysicalMemoryView`]) and
[`VirtualTranslate`] resolves virtual addresses of a view into physical ones.

All three are batch oriented: a single call takes a lazy sequence of operations described by
[`MemOps`] and reports every element back through either the success or the failure callback.
*/

pub mod mem_data;
pub mod memory_view;
pub mod phys_mem;
pub mod virt_translate;

#[doc(hidden)]
pub use mem_data::*;
#[doc(hidden)]
pub use memory_view::{MemoryView, MemoryViewMetadata};
#[doc(hidden)]
pub use phys_mem::{
    PhysicalMemory, PhysicalMemoryMapping, PhysicalMemoryMetadata, PhysicalMemoryView,
};
#[doc(hidden)]
pub use virt_translate::{
    VirtualTranslate, VirtualTranslation, VirtualTranslationCallback, VirtualTranslationFail,
    VirtualTranslationFailCallback,
};
