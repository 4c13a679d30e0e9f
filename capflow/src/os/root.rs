//! The top level of an OS layer.

use super::process::{Pid, ProcessInfo, ProcessInfoCallback};
use super::{find_first, AddressCallback, ModuleInfo, ModuleInfoCallback};

use crate::architecture::ArchitectureIdent;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::plugins::os::ProcessGroup;
use crate::types::{umem, Address};

/// Process and kernel module access provided by an OS layer.
///
/// Implementors only have to provide the address walks and the by-address lookups, the list and
/// by-name variants are derived from those. Processes come in two flavours: borrowing ones that
/// share the resources of the OS, and owning ones that consume it.
pub trait Os: Send {
    type ProcessType<'a>: ProcessGroup + 'a
    where
        Self: 'a;
    type IntoProcessType: ProcessGroup + Clone + 'static;

    /// Feeds the address of every process structure into `callback`.
    fn process_address_list_callback(&mut self, callback: AddressCallback) -> Result<()>;

    fn process_address_list(&mut self) -> Result<Vec<Address>> {
        let mut ret = vec![];
        self.process_address_list_callback((&mut ret).into())?;
        Ok(ret)
    }

    /// Feeds the information of every process into `callback`.
    ///
    /// By default every process address is resolved through
    /// [`process_info_by_address`](Self::process_info_by_address). Partially readable processes
    /// are left out, any other lookup error ends the walk.
    fn process_info_list_callback(&mut self, mut callback: ProcessInfoCallback) -> Result<()> {
        for addr in self.process_address_list()? {
            let info = match self.process_info_by_address(addr) {
                Ok(info) => info,
                Err(Error(_, ErrorKind::PartialData)) => {
                    log::trace!("skipping partially readable process {:x}", addr);
                    continue;
                }
                Err(e) => {
                    log::trace!("stopping process walk at {:x}: {}", addr, e);
                    break;
                }
            };

            if !callback.call(info) {
                break;
            }
        }
        Ok(())
    }

    fn process_info_list(&mut self) -> Result<Vec<ProcessInfo>> {
        let mut ret = vec![];
        self.process_info_list_callback((&mut ret).into())?;
        Ok(ret)
    }

    fn process_info_by_address(&mut self, address: Address) -> Result<ProcessInfo>;

    /// Looks up a process that is not known to be dead by its exact name.
    fn process_info_by_name(&mut self, name: &str) -> Result<ProcessInfo> {
        find_first(
            |cb| self.process_info_list_callback(cb),
            |info: &ProcessInfo| !info.state.is_dead() && info.name.as_str() == name,
            Error(ErrorOrigin::OsLayer, ErrorKind::ProcessNotFound),
        )
    }

    fn process_info_by_pid(&mut self, pid: Pid) -> Result<ProcessInfo> {
        find_first(
            |cb| self.process_info_list_callback(cb),
            |info: &ProcessInfo| info.pid == pid,
            Error(ErrorOrigin::OsLayer, ErrorKind::ProcessNotFound),
        )
    }

    /// Opens a process that shares the resources of the OS.
    fn process_by_info(&mut self, info: ProcessInfo) -> Result<Self::ProcessType<'_>>;

    /// Opens a process that takes over the resources of the OS.
    fn into_process_by_info(self, info: ProcessInfo) -> Result<Self::IntoProcessType>
    where
        Self: Sized;

    fn process_by_address(&mut self, addr: Address) -> Result<Self::ProcessType<'_>> {
        let info = self.process_info_by_address(addr)?;
        self.process_by_info(info)
    }

    fn process_by_name(&mut self, name: &str) -> Result<Self::ProcessType<'_>> {
        let info = self.process_info_by_name(name)?;
        self.process_by_info(info)
    }

    fn process_by_pid(&mut self, pid: Pid) -> Result<Self::ProcessType<'_>> {
        let info = self.process_info_by_pid(pid)?;
        self.process_by_info(info)
    }

    /// Consuming variant of [`process_by_address`](Self::process_by_address).
    ///
    /// The OS is dropped when the lookup fails.
    fn into_process_by_address(mut self, addr: Address) -> Result<Self::IntoProcessType>
    where
        Self: Sized,
    {
        let info = self.process_info_by_address(addr)?;
        self.into_process_by_info(info)
    }

    /// Consuming variant of [`process_by_name`](Self::process_by_name).
    fn into_process_by_name(mut self, name: &str) -> Result<Self::IntoProcessType>
    where
        Self: Sized,
    {
        let info = self.process_info_by_name(name)?;
        self.into_process_by_info(info)
    }

    /// Consuming variant of [`process_by_pid`](Self::process_by_pid).
    fn into_process_by_pid(mut self, pid: Pid) -> Result<Self::IntoProcessType>
    where
        Self: Sized,
    {
        let info = self.process_info_by_pid(pid)?;
        self.into_process_by_info(info)
    }

    /// Feeds the address of every kernel module structure into `callback`.
    fn module_address_list_callback(&mut self, callback: AddressCallback) -> Result<()>;

    /// Feeds every kernel module into `callback`, leaving out the ones that fail to resolve.
    fn module_list_callback(&mut self, mut callback: ModuleInfoCallback) -> Result<()> {
        let mut addrs: Vec<Address> = vec![];
        self.module_address_list_callback((&mut addrs).into())?;

        for address in addrs {
            match self.module_by_address(address) {
                Ok(info) => {
                    if !callback.call(info) {
                        break;
                    }
                }
                Err(e) => log::trace!("skipping kernel module {:x}: {}", address, e),
            }
        }

        Ok(())
    }

    fn module_list(&mut self) -> Result<Vec<ModuleInfo>> {
        let mut ret = vec![];
        self.module_list_callback((&mut ret).into())?;
        Ok(ret)
    }

    fn module_by_address(&mut self, address: Address) -> Result<ModuleInfo>;

    fn module_by_name(&mut self, name: &str) -> Result<ModuleInfo> {
        find_first(
            |cb| self.module_list_callback(cb),
            |info: &ModuleInfo| info.name.as_str() == name,
            Error(ErrorOrigin::OsLayer, ErrorKind::ModuleNotFound),
        )
    }

    /// Address of the main kernel module.
    fn primary_module_address(&mut self) -> Result<Address>;

    fn primary_module(&mut self) -> Result<ModuleInfo> {
        let addr = self.primary_module_address()?;
        self.module_by_address(addr)
    }

    fn info(&self) -> &OsInfo;
}

/// Kernel location and architecture of an OS.
///
/// `base` and `size` are zero when the layer has no kernel image to point at.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct OsInfo {
    pub base: Address,
    pub size: umem,
    pub arch: ArchitectureIdent,
}
