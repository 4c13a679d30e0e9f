use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::abi::{opt_call, CTup2, CTup3};
use crate::connector::{ConnectorCpuState, CpuState};
use crate::derive::connector;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::mem::{
    PhysicalMemory, PhysicalMemoryMetadata, PhysicalReadMemOps, PhysicalWriteMemOps,
};
use crate::plugins::{ConnectorArgs, ConnectorCpuStateFunctionTable, ConnectorGroup, TargetInfo};
use crate::types::{size, umem, Address};

/// Zero initialized physical memory living in the host process.
///
/// Clones share the same buffer, writes through one clone are visible through every other one.
#[derive(Clone)]
pub struct DummyMemory {
    buf: Arc<RwLock<Box<[u8]>>>,
    paused: Arc<AtomicBool>,
}

impl DummyMemory {
    pub fn new(size: umem) -> Self {
        Self {
            buf: Arc::new(RwLock::new(vec![0; size as usize].into_boxed_slice())),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> umem {
        self.buf.read().unwrap_or_else(PoisonError::into_inner).len() as umem
    }

    /// Whether a [`DummyCpuState`] currently holds the machine paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Number of handles sharing the buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.buf)
    }
}

fn range(addr: Address, len: usize, size: usize) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(addr.to_umem()).ok()?;
    let end = start.checked_add(len)?;
    (end <= size).then_some(start..end)
}

impl PhysicalMemory for DummyMemory {
    fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()> {
        let buf = self.buf.read().unwrap_or_else(PoisonError::into_inner);
        let (inp, mut out, mut out_fail) = data.into_parts();

        for CTup3(addr, meta, mut out_buf) in inp {
            match range(addr.address(), out_buf.len(), buf.len()) {
                Some(r) => {
                    out_buf.copy_from_slice(&buf[r]);
                    opt_call(out.as_deref_mut(), CTup2(meta, out_buf));
                }
                None => {
                    opt_call(out_fail.as_deref_mut(), CTup2(meta, out_buf));
                }
            }
        }

        Ok(())
    }

    fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()> {
        let mut buf = self.buf.write().unwrap_or_else(PoisonError::into_inner);
        let (inp, mut out, mut out_fail) = data.into_parts();

        for CTup3(addr, meta, in_buf) in inp {
            match range(addr.address(), in_buf.len(), buf.len()) {
                Some(r) => {
                    buf[r].copy_from_slice(&in_buf);
                    opt_call(out.as_deref_mut(), CTup2(meta, in_buf));
                }
                None => {
                    opt_call(out_fail.as_deref_mut(), CTup2(meta, in_buf));
                }
            }
        }

        Ok(())
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        let size = self.size();
        PhysicalMemoryMetadata {
            max_address: Address::from(size.saturating_sub(1)),
            real_size: size,
            readonly: false,
            ideal_batch_size: u32::MAX,
        }
    }
}

/// Pause switch of a [`DummyMemory`].
#[derive(Clone)]
pub struct DummyCpuState {
    paused: Arc<AtomicBool>,
}

impl CpuState for DummyCpuState {
    fn pause(&mut self) {
        self.paused.store(true, Ordering::SeqCst)
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::SeqCst)
    }
}

impl ConnectorCpuState for DummyMemory {
    type CpuStateType<'a> = DummyCpuState;
    type IntoCpuStateType = DummyCpuState;

    fn cpu_state(&mut self) -> Result<DummyCpuState> {
        Ok(DummyCpuState {
            paused: self.paused.clone(),
        })
    }

    fn into_cpu_state(self) -> Result<DummyCpuState> {
        Ok(DummyCpuState {
            paused: self.paused,
        })
    }
}

impl ConnectorGroup for DummyMemory {
    fn cpu_state_table(&self) -> Option<&'static ConnectorCpuStateFunctionTable> {
        Some(ConnectorCpuStateFunctionTable::of::<Self>())
    }
}

/// Reads the `size` argument, defaulting to 2 megabytes.
pub(crate) fn parse_size_arg(args: &ConnectorArgs) -> Result<umem> {
    match args.get("size").or_else(|| args.get_default()) {
        Some(size) => size::parse_size(size).map_err(|_| {
            Error(ErrorOrigin::Connector, ErrorKind::InvalidMemorySize)
                .log_error(format!("invalid memory size '{}'", size))
        }),
        None => Ok(size::mb(2)),
    }
}

fn help() -> String {
    "\
The dummy connector provides zero initialized memory inside the host process.

Available arguments are:
size: size of the memory, e.g. 16m or 0x1000 (default: 2m)"
        .to_string()
}

fn target_list() -> Result<Vec<TargetInfo>> {
    Ok(vec![])
}

#[connector(name = "dummy", help_fn = "help", target_list_fn = "target_list")]
pub fn create_connector(args: &ConnectorArgs) -> Result<DummyMemory> {
    Ok(DummyMemory::new(parse_size_arg(args)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemoryView;

    #[test]
    fn out_of_range_fails() {
        let mut mem = DummyMemory::new(size::kb(4));
        assert!(mem.phys_write(0xFFCu64.into(), &1u32).is_ok());
        assert!(mem.phys_write(0xFFEu64.into(), &1u32).is_err());
        assert!(mem.phys_read::<u64>(0x1000u64.into()).is_err());
    }

    #[test]
    fn clones_share_memory() {
        let mut mem = DummyMemory::new(size::kb(4));
        let mut clone = mem.clone();
        assert_eq!(mem.handle_count(), 2);

        clone.phys_write(0x20u64.into(), &0xABCDu16).unwrap();
        assert_eq!(mem.phys_read::<u16>(0x20u64.into()).unwrap(), 0xABCD);

        std::mem::drop(clone);
        assert_eq!(mem.handle_count(), 1);
    }

    #[test]
    fn cpu_state_pauses() {
        let mut mem = DummyMemory::new(size::kb(4));
        let mut state = mem.cpu_state().unwrap();
        state.pause();
        assert!(mem.is_paused());
        state.resume();
        assert!(!mem.is_paused());
    }

    #[test]
    fn size_argument() {
        assert_eq!(parse_size_arg(&"".parse().unwrap()), Ok(size::mb(2)));
        assert_eq!(parse_size_arg(&"size=16k".parse().unwrap()), Ok(size::kb(16)));
        assert_eq!(parse_size_arg(&"0x2000".parse().unwrap()), Ok(0x2000));
        assert_eq!(
            parse_size_arg(&"size=lots".parse().unwrap()),
            Err(Error(ErrorOrigin::Connector, ErrorKind::InvalidMemorySize))
        );
    }

    #[test]
    fn view_reads_zeroes() {
        let mut mem = DummyMemory::new(size::kb(4));
        assert_eq!(mem.phys_view().read::<u64>(0x100.into()).unwrap(), 0);
    }
}
