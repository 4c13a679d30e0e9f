/*!
Identification of the target architecture.

Backends describe the architecture of the system, of processes and of modules with an
[`ArchitectureIdent`]. It carries just enough information to reason about pointer widths and
endianness; translation itself is left to the backends.
*/

use std::fmt;

/// Identifies the architecture of a target system or process.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub enum ArchitectureIdent {
    /// Unknown architecture. Could be third-party implemented. The value is the page size.
    Unknown(usize),
    /// X86 with specified bitness and address extensions.
    ///
    /// The first argument is either 32 or 64. The second one states whether physical address
    /// extension is enabled (only meaningful for 32 bit).
    X86(u8, bool),
    /// ARM 64-bit architecture with specified page size.
    AArch64(usize),
}

impl ArchitectureIdent {
    /// Returns the size of a pointer on this architecture in bytes.
    pub fn size_addr(&self) -> usize {
        match self {
            ArchitectureIdent::X86(32, _) => 4,
            ArchitectureIdent::X86(_, _) | ArchitectureIdent::AArch64(_) => 8,
            ArchitectureIdent::Unknown(_) => std::mem::size_of::<usize>(),
        }
    }

    pub fn bits(&self) -> u8 {
        self.size_addr() as u8 * 8
    }

    pub fn page_size(&self) -> usize {
        match self {
            ArchitectureIdent::X86(_, _) => 0x1000,
            ArchitectureIdent::AArch64(page_size) | ArchitectureIdent::Unknown(page_size) => {
                *page_size
            }
        }
    }

    pub fn little_endian(&self) -> bool {
        match self {
            ArchitectureIdent::X86(_, _) | ArchitectureIdent::AArch64(_) => true,
            ArchitectureIdent::Unknown(_) => cfg!(target_endian = "little"),
        }
    }
}

impl fmt::Display for ArchitectureIdent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArchitectureIdent::X86(32, true) => f.write_str("x86_32 (pae)"),
            ArchitectureIdent::X86(bits, _) => write!(f, "x86_{}", bits),
            ArchitectureIdent::AArch64(_) => f.write_str("aarch64"),
            ArchitectureIdent::Unknown(page_size) => write!(f, "unknown ({:x} pages)", page_size),
        }
    }
}
