//! Describes an operating system in high level.
//!
//! There are 3 key parts describing an OS, each subsetting the previous level:
//! * [`Os`]
//! * [`Process`]
//! * [`ModuleInfo`]
//!
//! `Os` abstracts away the very root of the system. Often the underlying object is an OS kernel,
//! but it does not have to be one.
//!
//! `Process` abstracts away a single process. It provides memory access and module lists.
//!
//! `ModuleInfo` is just an information block, without any memory access.

pub mod keyboard;
pub mod module;
pub mod process;
pub mod root;

#[doc(hidden)]
pub use keyboard::{Keyboard, KeyboardState, OsKeyboard};

#[doc(hidden)]
pub use module::{
    ExportCallback, ExportInfo, ImportCallback, ImportInfo, ModuleAddressCallback,
    ModuleAddressInfo, ModuleInfo, ModuleInfoCallback, SectionCallback, SectionInfo,
};

#[doc(hidden)]
pub use process::{ExitCode, Pid, Process, ProcessInfo, ProcessInfoCallback, ProcessState};

#[doc(hidden)]
pub use root::{Os, OsInfo};

use crate::abi::OpaqueCallback;
use crate::error::{Error, Result};
use crate::types::Address;

pub type AddressCallback<'a> = OpaqueCallback<'a, Address>;

/// Runs an enumeration until `matches` accepts an item, stopping the walk there.
///
/// Fails with `missing` if the enumeration finishes without a match.
pub(crate) fn find_first<T>(
    walk: impl FnOnce(OpaqueCallback<'_, T>) -> Result<()>,
    mut matches: impl FnMut(&T) -> bool,
    missing: Error,
) -> Result<T> {
    let mut found = None;
    let mut accept = |item: T| {
        if matches(&item) {
            found = Some(item);
            false
        } else {
            true
        }
    };
    walk((&mut accept).into())?;
    found.ok_or(missing)
}
