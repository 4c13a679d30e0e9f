use rand::{RngCore, SeedableRng};
use rand_xorshift::XorShiftRng;

use super::keyboard::DummyKeyboard;
use super::mapping::LinearMapping;
use super::mem::{parse_size_arg, DummyMemory};
use super::process::{DummyModule, DummyProcess, DummyProcessInfo};

use crate::abi::FeedCallback;
use crate::architecture::ArchitectureIdent;
use crate::derive::os_layer;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::mem::{
    MemoryView, MemoryViewMetadata, PhysicalMemory, PhysicalMemoryMetadata, PhysicalReadMemOps,
    PhysicalWriteMemOps, ReadRawMemOps, VirtualTranslate, VirtualTranslationCallback,
    VirtualTranslationFailCallback, VtopRange, WriteRawMemOps,
};
use crate::os::{
    AddressCallback, ExportInfo, ImportInfo, ModuleInfo, Os, OsInfo, OsKeyboard, ProcessInfo,
    ProcessState, SectionInfo,
};
use crate::plugins::{
    ConnectorInstance, LibArc, MemoryViewFunctionTable, OsArgs, OsGroup,
    OsKeyboardFunctionTable, PhysicalMemoryFunctionTable, VirtualTranslateFunctionTable,
};
use crate::types::{umem, Address};

const ARCH: ArchitectureIdent = ArchitectureIdent::X86(64, false);

/// Virtual address the kernel region is mapped at.
pub const KERNEL_BASE: u64 = 0xFFFF_8000_0000_0000;

/// Virtual address every dummy process has its memory mapped at.
pub const PROCESS_BASE: u64 = 0x10000;

const PAGE_MASK: umem = !0xFFF;

/// Simulated operating system on top of any connector.
///
/// The physical memory is split into `procs + 1` equally sized regions. The first one holds the
/// kernel, every other one backs a single process. Process memory is filled with pseudo random
/// bytes seeded by the pid, with the pid itself stored at the start of the process. Every process
/// descriptor in kernel memory starts with the pid as well.
#[derive(Clone)]
pub struct DummyOs {
    mem: ConnectorInstance,
    kernel: LinearMapping,
    processes: Vec<DummyProcessInfo>,
    modules: Vec<ModuleInfo>,
    keyboard: DummyKeyboard,
    info: OsInfo,
}

impl DummyOs {
    pub fn new(mem: ConnectorInstance, procs: usize) -> Result<Self> {
        Self::try_new(mem, procs).map_err(|(err, _)| err)
    }

    /// Creates the OS on top of a freshly allocated [`DummyMemory`].
    pub fn with_memory(size: umem, procs: usize) -> Result<Self> {
        Self::new(
            ConnectorInstance::new(DummyMemory::new(size), LibArc::none()),
            procs,
        )
    }

    /// Hands the connector back if the layout could not be set up.
    fn try_new(
        mut mem: ConnectorInstance,
        procs: usize,
    ) -> std::result::Result<Self, (Error, ConnectorInstance)> {
        let region = (mem.metadata().real_size / (procs as umem + 1)) & PAGE_MASK;

        // the kernel region holds one descriptor per process after the first page
        if region < 0x2000 || 0x1000 + 0x100 * procs as umem > region {
            let err = Error(ErrorOrigin::OsLayer, ErrorKind::InvalidMemorySize).log_error(
                format!("not enough memory to host {} processes", procs),
            );
            return Err((err, mem));
        }

        let kernel = LinearMapping {
            virt_base: Address::from(KERNEL_BASE),
            phys_base: Address::null(),
            size: region,
        };

        let modules = ["kernel.sys", "hal.dll"]
            .iter()
            .enumerate()
            .map(|(i, name)| ModuleInfo {
                address: Address::from(KERNEL_BASE + 0x100 * (i as u64 + 1)),
                parent_process: Address::invalid(),
                base: Address::from(KERNEL_BASE) + i as umem * (region / 2),
                size: region / 2,
                name: (*name).into(),
                path: format!("\\SystemRoot\\system32\\{}", name).into(),
                arch: ARCH,
            })
            .collect();

        let mut processes = Vec::with_capacity(procs);
        for i in 0..procs {
            let proc = Self::process_layout(i, region);
            if let Err(err) = Self::populate(&mut mem, &proc) {
                return Err((err, mem));
            }
            processes.push(proc);
        }

        Ok(Self {
            mem,
            kernel,
            processes,
            modules,
            keyboard: DummyKeyboard::new(),
            info: OsInfo {
                base: Address::from(KERNEL_BASE),
                size: region,
                arch: ARCH,
            },
        })
    }

    fn process_layout(idx: usize, region: umem) -> DummyProcessInfo {
        let pid = (idx as u32 + 1) * 4;
        let address = Address::from(KERNEL_BASE + 0x1000 + 0x100 * idx as u64);
        let name = format!("proc{}.exe", idx);
        let half = region / 2;

        let main = ModuleInfo {
            address: address + 0x10u64,
            parent_process: address,
            base: Address::from(PROCESS_BASE),
            size: half,
            name: name.as_str().into(),
            path: format!("C:\\dummy\\{}", name).into(),
            arch: ARCH,
        };

        let lib = ModuleInfo {
            address: address + 0x20u64,
            parent_process: address,
            base: Address::from(PROCESS_BASE) + half,
            size: half,
            name: "libdummy.so".into(),
            path: "C:\\dummy\\libdummy.so".into(),
            arch: ARCH,
        };

        let sections = |m: &ModuleInfo| {
            vec![
                SectionInfo {
                    name: ".text".into(),
                    base: m.base,
                    size: m.size / 2,
                },
                SectionInfo {
                    name: ".data".into(),
                    base: m.base + m.size / 2,
                    size: m.size / 2,
                },
            ]
        };

        let modules = vec![
            DummyModule {
                imports: vec![
                    ImportInfo {
                        name: "malloc".into(),
                        offset: 0x100,
                    },
                    ImportInfo {
                        name: "free".into(),
                        offset: 0x108,
                    },
                ],
                exports: vec![ExportInfo {
                    name: "main".into(),
                    offset: 0x400,
                }],
                sections: sections(&main),
                info: main,
            },
            DummyModule {
                imports: vec![],
                exports: vec![
                    ExportInfo {
                        name: "malloc".into(),
                        offset: 0x200,
                    },
                    ExportInfo {
                        name: "free".into(),
                        offset: 0x280,
                    },
                ],
                sections: sections(&lib),
                info: lib,
            },
        ];

        DummyProcessInfo {
            info: ProcessInfo {
                address,
                pid,
                state: ProcessState::Alive,
                name: name.as_str().into(),
                path: format!("C:\\dummy\\{}", name).into(),
                command_line: format!("{} --dummy", name).into(),
                sys_arch: ARCH,
                proc_arch: ARCH,
            },
            mapping: LinearMapping {
                virt_base: Address::from(PROCESS_BASE),
                phys_base: Address::from(region * (idx as umem + 1)),
                size: region,
            },
            modules,
        }
    }

    fn populate(mem: &mut ConnectorInstance, proc: &DummyProcessInfo) -> Result<()> {
        let pid = proc.info.pid;
        let mut buf = vec![0u8; proc.mapping.size as usize];
        XorShiftRng::seed_from_u64(pid as u64).fill_bytes(&mut buf);
        buf[..4].copy_from_slice(&pid.to_le_bytes());
        mem.phys_write_raw(proc.mapping.phys_base.into(), &buf)?;

        let descriptor = proc.info.address.to_umem() - KERNEL_BASE;
        mem.phys_write(descriptor.into(), &pid)
    }

    fn find_process(&self, address: Address) -> Result<&DummyProcessInfo> {
        self.processes
            .iter()
            .find(|p| p.info.address == address)
            .ok_or(Error(ErrorOrigin::OsLayer, ErrorKind::ProcessNotFound))
    }
}

impl Os for DummyOs {
    type ProcessType<'a> = DummyProcess<&'a mut ConnectorInstance>;
    type IntoProcessType = DummyProcess<ConnectorInstance>;

    fn process_address_list_callback(&mut self, callback: AddressCallback) -> Result<()> {
        self.processes
            .iter()
            .map(|p| p.info.address)
            .feed_into(callback);
        Ok(())
    }

    fn process_info_by_address(&mut self, address: Address) -> Result<ProcessInfo> {
        self.find_process(address).map(|p| p.info.clone())
    }

    fn process_by_info(&mut self, info: ProcessInfo) -> Result<Self::ProcessType<'_>> {
        let proc = self.find_process(info.address)?.clone();
        Ok(DummyProcess::new(proc, &mut self.mem))
    }

    fn into_process_by_info(self, info: ProcessInfo) -> Result<Self::IntoProcessType> {
        let proc = self.find_process(info.address)?.clone();
        Ok(DummyProcess::new(proc, self.mem))
    }

    fn module_address_list_callback(&mut self, callback: AddressCallback) -> Result<()> {
        self.modules.iter().map(|m| m.address).feed_into(callback);
        Ok(())
    }

    fn module_by_address(&mut self, address: Address) -> Result<ModuleInfo> {
        self.modules
            .iter()
            .find(|m| m.address == address)
            .cloned()
            .ok_or(Error(ErrorOrigin::OsLayer, ErrorKind::ModuleNotFound))
    }

    fn primary_module_address(&mut self) -> Result<Address> {
        self.modules
            .first()
            .map(|m| m.address)
            .ok_or(Error(ErrorOrigin::OsLayer, ErrorKind::ModuleNotFound))
    }

    fn info(&self) -> &OsInfo {
        &self.info
    }
}

impl PhysicalMemory for DummyOs {
    fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()> {
        self.mem.phys_read_raw_iter(data)
    }

    fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()> {
        self.mem.phys_write_raw_iter(data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        self.mem.metadata()
    }
}

impl MemoryView for DummyOs {
    fn read_raw_iter(&mut self, data: ReadRawMemOps) -> Result<()> {
        self.kernel.read(&mut self.mem, data)
    }

    fn write_raw_iter(&mut self, data: WriteRawMemOps) -> Result<()> {
        self.kernel.write(&mut self.mem, data)
    }

    fn metadata(&self) -> MemoryViewMetadata {
        self.kernel.metadata()
    }
}

impl VirtualTranslate for DummyOs {
    fn virt_to_phys_list(
        &mut self,
        addrs: &[VtopRange],
        out: VirtualTranslationCallback,
        out_fail: VirtualTranslationFailCallback,
    ) {
        self.kernel.virt_to_phys_list(addrs, out, out_fail)
    }
}

impl OsKeyboard for DummyOs {
    type KeyboardType<'a> = DummyKeyboard;
    type IntoKeyboardType = DummyKeyboard;

    fn keyboard(&mut self) -> Result<DummyKeyboard> {
        Ok(self.keyboard.clone())
    }

    fn into_keyboard(self) -> Result<DummyKeyboard> {
        Ok(self.keyboard)
    }
}

impl OsGroup for DummyOs {
    fn phys_mem_table(&self) -> Option<&'static PhysicalMemoryFunctionTable> {
        Some(PhysicalMemoryFunctionTable::of::<Self>())
    }

    fn memory_view_table(&self) -> Option<&'static MemoryViewFunctionTable> {
        Some(MemoryViewFunctionTable::of::<Self>())
    }

    fn virt_translate_table(&self) -> Option<&'static VirtualTranslateFunctionTable> {
        Some(VirtualTranslateFunctionTable::of::<Self>())
    }

    fn os_keyboard_table(&self) -> Option<&'static OsKeyboardFunctionTable> {
        Some(OsKeyboardFunctionTable::of::<Self>())
    }
}

fn parse_procs_arg(args: &OsArgs) -> Result<usize> {
    match args.get("procs") {
        Some(procs) => procs.parse().map_err(|_| {
            Error(ErrorOrigin::OsLayer, ErrorKind::ArgValidation)
                .log_error(format!("invalid process count '{}'", procs))
        }),
        None => Ok(3),
    }
}

fn help() -> String {
    "\
The dummy os simulates a set of processes on top of any connector.

Available arguments are:
procs: number of processes to simulate (default: 3)
size: memory size when used without a connector, e.g. 16m (default: 2m)"
        .to_string()
}

#[os_layer(name = "dummy", help_fn = "help")]
pub fn create_os(args: &OsArgs, connector: &mut Option<ConnectorInstance>) -> Result<DummyOs> {
    let procs = parse_procs_arg(args)?;

    match connector.take() {
        Some(mem) => DummyOs::try_new(mem, procs).map_err(|(err, mem)| {
            *connector = Some(mem);
            err
        }),
        None => DummyOs::with_memory(parse_size_arg(args)?, procs),
    }
}
