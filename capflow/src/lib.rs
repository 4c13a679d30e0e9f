//!
//! # capflow
//!
//! Capability objects and plugin loading for memory introspection backends
//!
//! ## Introduction
//!
//! capflow lets a host program drive memory introspection backends that were built independently
//! and loaded at runtime. There are 2 primary kinds of plugins - _Connectors_ and _OS layers_.
//! A connector provides raw access to the physical memory of a machine. An OS layer builds a
//! higher level abstraction on top of a connector, providing access to processes, their modules,
//! keyboard state and so on. OS layers and connectors can be chained, each one feeding the next.
//!
//! Every plugin object crosses the library boundary as a _capability object_: an opaque instance
//! together with a set of C ABI function tables, one per capability the object supports. The
//! mandatory capabilities of an object are usable directly through the regular traits, while
//! optional ones are queried at runtime.
//!
//! # Structure
//!
//! [mem](crate::mem) is concerned with memory interfacing, [os](crate::os) with OS abstractions,
//! [connector](crate::connector) with connector side extras such as cpu state control.
//! [types](crate::types) holds the data types used everywhere, [abi](crate::abi) the FFI-safe
//! building blocks, while [plugins](crate::plugins) defines the dynamically loadable plugin types
//! and the [Inventory](crate::plugins::Inventory) that finds and instantiates them.
//!
//! ## Getting started
//!
//! ```
//! use capflow::prelude::v1::*;
//!
//! fn special_read(mem: &mut impl MemoryView) -> Result<u64> {
//!     mem.read(Address::from(0x42)).data()
//! }
//!
//! let inventory = Inventory::scan();
//! if let Ok(mut os) = inventory.builder().connector("kvm").os("win32").build() {
//!     if let Some(mut kernel) = os.as_memory_view() {
//!         special_read(&mut kernel).ok();
//!     }
//! }
//! ```
//!
//! ### Class diagrams
//!
//! ```text
//! +----------------------------+    +----------------------------+
//! |                            |    |                            |
//! |      ConnectorInstance     |    |         OsInstance         |
//! |                            |    |                            |
//! | +------------------------+ |    | +------------------------+ |
//! | |     PhysicalMemory     | |    | |           Os           | |
//! | +------------------------+ |    | +------------------------+ |
//! |                            |    |                            |
//! | +------------------------+ |    | +------------------------+ |
//! | |         Clone          | |    | |         Clone          | |
//! | +------------------------+ |    | +------------------------+ |
//! |                            |    |                            |
//! |         Optional:          |    |         Optional:          |
//! |                            |    |                            |
//! | +------------------------+ |    | +------------------------+ |
//! | |   ConnectorCpuState    | |    | |       MemoryView       | |
//! | +------------------------+ |    | +------------------------+ |
//! |                            |    |                            |
//! +----------------------------+    | +------------------------+ |
//!                                   | |    VirtualTranslate    | |
//!                                   | +------------------------+ |
//!                                   |                            |
//!                                   | +------------------------+ |
//!                                   | |     PhysicalMemory     | |
//!                                   | +------------------------+ |
//!                                   |                            |
//!                                   | +------------------------+ |
//!                                   | |       OsKeyboard       | |
//! +----------------------------+    | +------------------------+ |
//! |                            |    +----------------------------+
//! |     IntoProcessInstance    |
//! |                            |    +----------------------------+
//! | +------------------------+ |    |                            |
//! | |        Process         | |    |       ProcessInstance      |
//! | +------------------------+ |    |                            |
//! |                            |    | +------------------------+ |
//! | +------------------------+ |    | |        Process         | |
//! | |       MemoryView       | |    | +------------------------+ |
//! | +------------------------+ |    |                            |
//! |                            |    | +------------------------+ |
//! | +------------------------+ |    | |       MemoryView       | |
//! | |         Clone          | |    | +------------------------+ |
//! | +------------------------+ |    |                            |
//! |                            |    |         Optional:          |
//! |         Optional:          |    |                            |
//! |                            |    | +------------------------+ |
//! | +------------------------+ |    | |    VirtualTranslate    | |
//! | |    VirtualTranslate    | |    | +------------------------+ |
//! | +------------------------+ |    |                            |
//! |                            |    +----------------------------+
//! +----------------------------+
//! ```

// umem equals u64 on every target, clippy flags the remaining conversions.
#![allow(clippy::unnecessary_cast)]

pub mod error;

pub mod types;

pub mod abi;

pub mod architecture;

pub mod mem;

pub mod connector;

pub mod os;

pub mod plugins;

#[doc(hidden)]
pub mod derive {
    pub use ::capflow_derive::*;
}

#[doc(hidden)]
pub mod dataview {
    pub use ::dataview::*;
}

#[doc(hidden)]
pub mod abi_stable {
    pub use ::abi_stable::*;
}

#[doc(hidden)]
#[cfg(any(feature = "dummy_mem", test))]
pub mod dummy;

#[doc(hidden)]
#[allow(ambiguous_glob_reexports)]
pub mod prelude {
    pub mod v1 {
        pub use crate::abi::*;
        pub use crate::architecture::*;
        pub use crate::connector::*;
        pub use crate::dataview::Pod;
        pub use crate::derive::*;
        pub use crate::error::*;
        pub use crate::mem::*;
        pub use crate::os::*;
        pub use crate::plugins::*;
        pub use crate::types::*;
    }
    pub use v1::*;
}
