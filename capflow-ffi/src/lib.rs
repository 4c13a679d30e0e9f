//! C bindings for capflow.
//!
//! Capability objects are handed out by value into caller provided storage and have to be
//! released with the matching `*_drop` function. The inventory is heap allocated and released
//! with `inventory_free`.

pub mod log;

pub mod mem;

pub mod os;

pub mod plugins;

pub mod util;
