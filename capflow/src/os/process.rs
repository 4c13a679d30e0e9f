//! Describes processes

use super::{
    find_first, ExportCallback, ExportInfo, ImportCallback, ImportInfo, ModuleAddressCallback,
    ModuleAddressInfo, ModuleInfo, ModuleInfoCallback, SectionCallback, SectionInfo,
};
use crate::abi::{OpaqueCallback, ReprCString};
use crate::architecture::ArchitectureIdent;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::types::Address;

pub type Pid = u32;

pub type ExitCode = i32;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub enum ProcessState {
    Unknown,
    Alive,
    Dead(ExitCode),
}

impl ProcessState {
    pub fn is_alive(&self) -> bool {
        matches!(*self, ProcessState::Alive)
    }

    pub fn is_dead(&self) -> bool {
        matches!(*self, ProcessState::Dead(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(*self, ProcessState::Unknown)
    }
}

/// Module and symbol access of a single process.
///
/// Memory of the process is reached through [`MemoryView`](crate::mem::MemoryView), which every
/// process type implements next to this trait.
pub trait Process: Send {
    fn state(&mut self) -> ProcessState;

    /// Feeds the address of every module structure into `callback`.
    ///
    /// `target_arch` restricts the walk to modules of one architecture, which matters for
    /// emulated processes where `sys_arch` and `proc_arch` differ. `None` walks all of them.
    fn module_address_list_callback(
        &mut self,
        target_arch: Option<&ArchitectureIdent>,
        callback: ModuleAddressCallback,
    ) -> Result<()>;

    /// Feeds every module into `callback`, leaving out the ones that fail to resolve.
    fn module_list_callback(
        &mut self,
        target_arch: Option<&ArchitectureIdent>,
        mut callback: ModuleInfoCallback,
    ) -> Result<()> {
        let mut addrs: Vec<ModuleAddressInfo> = vec![];
        self.module_address_list_callback(target_arch, (&mut addrs).into())?;

        for ModuleAddressInfo { address, arch } in addrs {
            match self.module_by_address(address, arch) {
                Ok(info) => {
                    if !callback.call(info) {
                        break;
                    }
                }
                Err(e) => log::trace!("skipping module {:x}: {}", address, e),
            }
        }

        Ok(())
    }

    fn module_by_address(
        &mut self,
        address: Address,
        architecture: ArchitectureIdent,
    ) -> Result<ModuleInfo>;

    /// Looks up a module by its exact name.
    fn module_by_name_arch(
        &mut self,
        name: &str,
        architecture: Option<&ArchitectureIdent>,
    ) -> Result<ModuleInfo> {
        find_first(
            |cb| self.module_list_callback(architecture, cb),
            |item: &ModuleInfo| item.name.as_str() == name,
            Error(ErrorOrigin::Process, ErrorKind::ModuleNotFound),
        )
    }

    fn module_by_name(&mut self, name: &str) -> Result<ModuleInfo> {
        self.module_by_name_arch(name, None)
    }

    fn module_list_arch(
        &mut self,
        target_arch: Option<&ArchitectureIdent>,
    ) -> Result<Vec<ModuleInfo>> {
        let mut ret = vec![];
        self.module_list_callback(target_arch, (&mut ret).into())?;
        Ok(ret)
    }

    fn module_list(&mut self) -> Result<Vec<ModuleInfo>> {
        self.module_list_arch(None)
    }

    /// Address of the module structure of the main executable.
    fn primary_module_address(&mut self) -> Result<Address>;

    fn primary_module(&mut self) -> Result<ModuleInfo> {
        let addr = self.primary_module_address()?;
        let arch = self.info().proc_arch;
        self.module_by_address(addr, arch)
    }

    fn module_import_list_callback(
        &mut self,
        info: &ModuleInfo,
        callback: ImportCallback,
    ) -> Result<()>;

    fn module_export_list_callback(
        &mut self,
        info: &ModuleInfo,
        callback: ExportCallback,
    ) -> Result<()>;

    fn module_section_list_callback(
        &mut self,
        info: &ModuleInfo,
        callback: SectionCallback,
    ) -> Result<()>;

    fn module_import_list(&mut self, info: &ModuleInfo) -> Result<Vec<ImportInfo>> {
        let mut ret = vec![];
        self.module_import_list_callback(info, (&mut ret).into())?;
        Ok(ret)
    }

    fn module_export_list(&mut self, info: &ModuleInfo) -> Result<Vec<ExportInfo>> {
        let mut ret = vec![];
        self.module_export_list_callback(info, (&mut ret).into())?;
        Ok(ret)
    }

    fn module_section_list(&mut self, info: &ModuleInfo) -> Result<Vec<SectionInfo>> {
        let mut ret = vec![];
        self.module_section_list_callback(info, (&mut ret).into())?;
        Ok(ret)
    }

    fn module_import_by_name(&mut self, info: &ModuleInfo, name: &str) -> Result<ImportInfo> {
        find_first(
            |cb| self.module_import_list_callback(info, cb),
            |item: &ImportInfo| item.name.as_str() == name,
            Error(ErrorOrigin::Process, ErrorKind::ImportNotFound),
        )
    }

    fn module_export_by_name(&mut self, info: &ModuleInfo, name: &str) -> Result<ExportInfo> {
        find_first(
            |cb| self.module_export_list_callback(info, cb),
            |item: &ExportInfo| item.name.as_str() == name,
            Error(ErrorOrigin::Process, ErrorKind::ExportNotFound),
        )
    }

    fn module_section_by_name(&mut self, info: &ModuleInfo, name: &str) -> Result<SectionInfo> {
        find_first(
            |cb| self.module_section_list_callback(info, cb),
            |item: &SectionInfo| item.name.as_str() == name,
            Error(ErrorOrigin::Process, ErrorKind::SectionNotFound),
        )
    }

    fn info(&self) -> &ProcessInfo;
}

/// Snapshot of what an OS layer knows about a process.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct ProcessInfo {
    /// Backend specific handle of the process, usually the kernel structure describing it.
    pub address: Address,
    pub pid: Pid,
    /// State at the time the info was taken.
    pub state: ProcessState,
    pub name: ReprCString,
    pub path: ReprCString,
    pub command_line: ReprCString,
    pub sys_arch: ArchitectureIdent,
    /// Differs from `sys_arch` for emulated processes, e.g. 32 bit code on a 64 bit system.
    pub proc_arch: ArchitectureIdent,
}

impl ProcessInfo {
    pub fn sys_arch(&self) -> &ArchitectureIdent {
        &self.sys_arch
    }

    pub fn proc_arch(&self) -> &ArchitectureIdent {
        &self.proc_arch
    }
}

pub type ProcessInfoCallback<'a> = OpaqueCallback<'a, ProcessInfo>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::FeedCallback;
    use crate::types::umem;

    struct Modules {
        info: ProcessInfo,
        reads: usize,
    }

    const ARCH: ArchitectureIdent = ArchitectureIdent::X86(64, false);

    impl Modules {
        fn new() -> Self {
            Self {
                info: ProcessInfo {
                    address: 0x1000.into(),
                    pid: 4,
                    state: ProcessState::Alive,
                    name: "init".into(),
                    path: "/sbin/init".into(),
                    command_line: "/sbin/init".into(),
                    sys_arch: ARCH,
                    proc_arch: ARCH,
                },
                reads: 0,
            }
        }
    }

    impl Process for Modules {
        fn state(&mut self) -> ProcessState {
            self.info.state
        }

        fn module_address_list_callback(
            &mut self,
            _target_arch: Option<&ArchitectureIdent>,
            callback: ModuleAddressCallback,
        ) -> Result<()> {
            (1..=10u64)
                .map(|i| ModuleAddressInfo {
                    address: Address::from(i * 0x100),
                    arch: ARCH,
                })
                .feed_into(callback);
            Ok(())
        }

        fn module_by_address(
            &mut self,
            address: Address,
            arch: ArchitectureIdent,
        ) -> Result<ModuleInfo> {
            self.reads += 1;
            // every fourth module is unreadable
            if address.to_umem() % 0x400 == 0 {
                return Err(Error(ErrorOrigin::Process, ErrorKind::PartialData));
            }
            let idx = address.to_umem() / 0x100;
            Ok(ModuleInfo {
                address,
                parent_process: self.info.address,
                base: Address::from(idx * 0x10_0000),
                size: 0x1000 as umem,
                name: format!("mod{}.so", idx).into(),
                path: format!("/lib/mod{}.so", idx).into(),
                arch,
            })
        }

        fn primary_module_address(&mut self) -> Result<Address> {
            Ok(Address::from(0x100))
        }

        fn module_import_list_callback(
            &mut self,
            _info: &ModuleInfo,
            _callback: ImportCallback,
        ) -> Result<()> {
            Ok(())
        }

        fn module_export_list_callback(
            &mut self,
            _info: &ModuleInfo,
            callback: ExportCallback,
        ) -> Result<()> {
            ["open", "close"]
                .iter()
                .enumerate()
                .map(|(i, name)| ExportInfo {
                    name: (*name).into(),
                    offset: i as umem * 0x10,
                })
                .feed_into(callback);
            Ok(())
        }

        fn module_section_list_callback(
            &mut self,
            _info: &ModuleInfo,
            _callback: SectionCallback,
        ) -> Result<()> {
            Ok(())
        }

        fn info(&self) -> &ProcessInfo {
            &self.info
        }
    }

    #[test]
    fn module_list_skips_unreadable() {
        let mut proc = Modules::new();
        let list = proc.module_list().unwrap();
        assert_eq!(list.len(), 8);
        assert!(list.iter().all(|m| m.address.to_umem() % 0x400 != 0));
    }

    #[test]
    fn module_by_name_stops_early() {
        let mut proc = Modules::new();
        let module = proc.module_by_name("mod3.so").unwrap();
        assert_eq!(module.base, Address::from(0x30_0000));
        assert_eq!(proc.reads, 3);

        assert_eq!(
            proc.module_by_name("missing.so"),
            Err(Error(ErrorOrigin::Process, ErrorKind::ModuleNotFound))
        );
    }

    #[test]
    fn primary_module_and_exports() {
        let mut proc = Modules::new();
        let primary = proc.primary_module().unwrap();
        assert_eq!(primary.name.as_str(), "mod1.so");

        let export = proc.module_export_by_name(&primary, "close").unwrap();
        assert_eq!(export.offset, 0x10);
        assert!(proc.module_import_by_name(&primary, "open").is_err());
    }
}
