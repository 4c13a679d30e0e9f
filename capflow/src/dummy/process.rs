use super::mapping::LinearMapping;

use crate::abi::FeedCallback;
use crate::architecture::ArchitectureIdent;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::mem::{
    MemoryView, MemoryViewMetadata, PhysicalMemory, ReadRawMemOps, VirtualTranslate,
    VirtualTranslationCallback, VirtualTranslationFailCallback, VtopRange, WriteRawMemOps,
};
use crate::os::{
    ExportCallback, ExportInfo, ImportCallback, ImportInfo, ModuleAddressCallback,
    ModuleAddressInfo, ModuleInfo, Process, ProcessInfo, ProcessState, SectionCallback,
    SectionInfo,
};
use crate::plugins::{ProcessGroup, VirtualTranslateFunctionTable};
use crate::types::Address;

/// A module of a dummy process together with its symbol tables.
#[derive(Clone, Debug)]
pub struct DummyModule {
    pub info: ModuleInfo,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    pub sections: Vec<SectionInfo>,
}

/// Everything needed to open a dummy process.
#[derive(Clone, Debug)]
pub struct DummyProcessInfo {
    pub info: ProcessInfo,
    pub mapping: LinearMapping,
    pub modules: Vec<DummyModule>,
}

impl DummyProcessInfo {
    fn module(&self, info: &ModuleInfo) -> Result<&DummyModule> {
        self.modules
            .iter()
            .find(|m| m.info.address == info.address)
            .ok_or(Error(ErrorOrigin::Process, ErrorKind::ModuleNotFound))
    }
}

/// Process of a [`DummyOs`](super::DummyOs), reading through the physical memory `T`.
#[derive(Clone)]
pub struct DummyProcess<T> {
    pub proc: DummyProcessInfo,
    pub mem: T,
}

impl<T> DummyProcess<T> {
    pub fn new(proc: DummyProcessInfo, mem: T) -> Self {
        Self { proc, mem }
    }
}

impl<T: PhysicalMemory> Process for DummyProcess<T> {
    fn state(&mut self) -> ProcessState {
        self.proc.info.state
    }

    fn module_address_list_callback(
        &mut self,
        target_arch: Option<&ArchitectureIdent>,
        callback: ModuleAddressCallback,
    ) -> Result<()> {
        self.proc
            .modules
            .iter()
            .filter(|m| target_arch.map(|a| *a == m.info.arch).unwrap_or(true))
            .map(|m| ModuleAddressInfo {
                address: m.info.address,
                arch: m.info.arch,
            })
            .feed_into(callback);
        Ok(())
    }

    fn module_by_address(
        &mut self,
        address: Address,
        architecture: ArchitectureIdent,
    ) -> Result<ModuleInfo> {
        self.proc
            .modules
            .iter()
            .find(|m| m.info.address == address && m.info.arch == architecture)
            .map(|m| m.info.clone())
            .ok_or(Error(ErrorOrigin::Process, ErrorKind::ModuleNotFound))
    }

    fn primary_module_address(&mut self) -> Result<Address> {
        self.proc
            .modules
            .first()
            .map(|m| m.info.address)
            .ok_or(Error(ErrorOrigin::Process, ErrorKind::ModuleNotFound))
    }

    fn module_import_list_callback(
        &mut self,
        info: &ModuleInfo,
        callback: ImportCallback,
    ) -> Result<()> {
        self.proc.module(info)?.imports.iter().cloned().feed_into(callback);
        Ok(())
    }

    fn module_export_list_callback(
        &mut self,
        info: &ModuleInfo,
        callback: ExportCallback,
    ) -> Result<()> {
        self.proc.module(info)?.exports.iter().cloned().feed_into(callback);
        Ok(())
    }

    fn module_section_list_callback(
        &mut self,
        info: &ModuleInfo,
        callback: SectionCallback,
    ) -> Result<()> {
        self.proc.module(info)?.sections.iter().cloned().feed_into(callback);
        Ok(())
    }

    fn info(&self) -> &ProcessInfo {
        &self.proc.info
    }
}

impl<T: PhysicalMemory> MemoryView for DummyProcess<T> {
    fn read_raw_iter(&mut self, data: ReadRawMemOps) -> Result<()> {
        self.proc.mapping.read(&mut self.mem, data)
    }

    fn write_raw_iter(&mut self, data: WriteRawMemOps) -> Result<()> {
        self.proc.mapping.write(&mut self.mem, data)
    }

    fn metadata(&self) -> MemoryViewMetadata {
        self.proc.mapping.metadata()
    }
}

impl<T: PhysicalMemory> VirtualTranslate for DummyProcess<T> {
    fn virt_to_phys_list(
        &mut self,
        addrs: &[VtopRange],
        out: VirtualTranslationCallback,
        out_fail: VirtualTranslationFailCallback,
    ) {
        self.proc.mapping.virt_to_phys_list(addrs, out, out_fail)
    }
}

impl<T: PhysicalMemory> ProcessGroup for DummyProcess<T> {
    fn virt_translate_table(&self) -> Option<&'static VirtualTranslateFunctionTable> {
        Some(VirtualTranslateFunctionTable::of::<Self>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::DummyMemory;
    use crate::error::PartialResultExt;
    use crate::types::{size, umem};

    const ARCH: ArchitectureIdent = ArchitectureIdent::X86(64, false);

    fn process() -> DummyProcess<DummyMemory> {
        let module = ModuleInfo {
            address: Address::from(0x210u64),
            parent_process: Address::from(0x200u64),
            base: Address::from(0x10000u64),
            size: 0x1000,
            name: "main.exe".into(),
            path: "/bin/main.exe".into(),
            arch: ARCH,
        };

        DummyProcess::new(
            DummyProcessInfo {
                info: ProcessInfo {
                    address: Address::from(0x200u64),
                    pid: 8,
                    state: ProcessState::Alive,
                    name: "main.exe".into(),
                    path: "/bin/main.exe".into(),
                    command_line: "main.exe".into(),
                    sys_arch: ARCH,
                    proc_arch: ARCH,
                },
                mapping: LinearMapping {
                    virt_base: Address::from(0x10000u64),
                    phys_base: Address::from(0x2000u64),
                    size: 0x1000 as umem,
                },
                modules: vec![DummyModule {
                    info: module,
                    imports: vec![],
                    exports: vec![ExportInfo {
                        name: "main".into(),
                        offset: 0x40,
                    }],
                    sections: vec![SectionInfo {
                        name: ".text".into(),
                        base: Address::from(0x10000u64),
                        size: 0x800,
                    }],
                }],
            },
            DummyMemory::new(size::kb(16)),
        )
    }

    #[test]
    fn reads_through_mapping() {
        let mut proc = process();
        proc.mem.phys_write(0x2010u64.into(), &0xDEADu16).unwrap();

        assert_eq!(proc.read::<u16>(0x10010u64.into()).data().unwrap(), 0xDEAD);
        assert!(proc.read::<u16>(0x11000u64.into()).is_err());
        assert_eq!(
            proc.virt_to_phys(0x10010u64.into()).unwrap().address(),
            Address::from(0x2010u64)
        );
    }

    #[test]
    fn module_tables() {
        let mut proc = process();
        let primary = proc.primary_module().unwrap();
        assert_eq!(primary.name.as_str(), "main.exe");
        assert_eq!(proc.module_export_by_name(&primary, "main").unwrap().offset, 0x40);
        assert!(proc.module_section_by_name(&primary, ".text").is_ok());

        let mut foreign = primary.clone();
        foreign.address = Address::from(0x999u64);
        assert_eq!(
            proc.module_import_list(&foreign),
            Err(Error(ErrorOrigin::Process, ErrorKind::ModuleNotFound))
        );
    }
}
