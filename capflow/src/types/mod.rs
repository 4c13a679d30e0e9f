/*!
Basic value types shared by every capability.

Addresses, physical addresses with page information and size helpers.
*/

pub mod address;
#[doc(hidden)]
pub use address::{imem, umem, Address};

pub mod size;

pub mod page;
#[doc(hidden)]
pub use page::PageType;

pub mod physical_address;
#[doc(hidden)]
pub use physical_address::PhysicalAddress;
