//! Module information blocks.

use crate::abi::{OpaqueCallback, ReprCString};
use crate::architecture::ArchitectureIdent;
use crate::types::{umem, Address};

/// Describes a module loaded into a process (or into the OS kernel).
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct ModuleInfo {
    /// Backend specific address of the module's descriptor structure.
    pub address: Address,
    /// Address of the process this module belongs to, as in [`ProcessInfo::address`].
    ///
    /// [`ProcessInfo::address`]: super::ProcessInfo::address
    pub parent_process: Address,
    /// Base address the module is mapped at, in the virtual address space of the parent.
    pub base: Address,
    pub size: umem,
    pub name: ReprCString,
    pub path: ReprCString,
    /// Architecture of the module.
    ///
    /// Emulated processes can contain modules of both the process and the system architecture.
    pub arch: ArchitectureIdent,
}

pub type ModuleInfoCallback<'a> = OpaqueCallback<'a, ModuleInfo>;

/// Pair of module descriptor address and architecture.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct ModuleAddressInfo {
    pub address: Address,
    pub arch: ArchitectureIdent,
}

pub type ModuleAddressCallback<'a> = OpaqueCallback<'a, ModuleAddressInfo>;

#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct ImportInfo {
    pub name: ReprCString,
    /// Offset of the import from the base of the module.
    pub offset: umem,
}

pub type ImportCallback<'a> = OpaqueCallback<'a, ImportInfo>;

#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct ExportInfo {
    pub name: ReprCString,
    /// Offset of the export from the base of the module.
    pub offset: umem,
}

pub type ExportCallback<'a> = OpaqueCallback<'a, ExportInfo>;

#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct SectionInfo {
    pub name: ReprCString,
    /// Virtual address of the section, i.e. module base plus section offset.
    pub base: Address,
    pub size: umem,
}

impl SectionInfo {
    /// Checks whether this section has the given name, ignoring a `.` or `__` prefix.
    pub fn is_section(&self, name: &str) -> bool {
        let n = self.name.as_str();
        n.strip_prefix('.')
            .or_else(|| n.strip_prefix("__"))
            .map(|n| n == name)
            .unwrap_or(false)
    }

    pub fn is_text(&self) -> bool {
        self.is_section("text")
    }
}

pub type SectionCallback<'a> = OpaqueCallback<'a, SectionInfo>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_prefixes() {
        let section = |name: &str| SectionInfo {
            name: name.into(),
            base: Address::NULL,
            size: 0,
        };

        assert!(section(".text").is_text());
        assert!(section("__text").is_text());
        assert!(!section("text").is_text());
        assert!(section(".data").is_section("data"));
        assert!(!section(".data").is_section("text"));
    }
}
