/*!
Type erased instance storage shared by every capability object.

A [`Container`] holds the backend instance behind an opaque [`CBox`] together with a reference to
the library the instance was created by. Function tables in the sibling modules operate purely on
containers; each table entry is monomorphized for the concrete backend type at construction time.
*/

use crate::abi::c_void;

use crate::abi::{CBox, COptArc};
use crate::error::{part_result_from_int_void, PartialError, Result};

/// Reference to the library an instance was created by.
///
/// Keeps the library loaded for as long as any instance (or clone of one) is alive. Builtin
/// backends carry an empty reference.
pub type LibArc = COptArc<c_void>;

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct Container<'a> {
    // Field order matters, the instance has to be dropped before the library is released.
    instance: CBox<'a, c_void>,
    context: LibArc,
}

impl<'a> Container<'a> {
    /// Moves `instance` into a new owning container.
    pub fn new<T: Send + 'a>(instance: T, context: LibArc) -> Self {
        Self {
            instance: CBox::from(Box::new(instance)).into_opaque(),
            context,
        }
    }

    /// Creates a container that only borrows `instance`.
    ///
    /// Dropping the container leaves the instance alive.
    pub fn from_mut<T: Send>(instance: &'a mut T, context: LibArc) -> Self {
        Self {
            instance: CBox::from(instance).into_opaque(),
            context,
        }
    }

    pub fn context(&self) -> &LibArc {
        &self.context
    }

    pub fn is_owned(&self) -> bool {
        self.instance.is_owned()
    }

    /// # Safety
    ///
    /// The container must have been created with an instance of type `T`.
    pub unsafe fn instance_ref<T>(&self) -> &T {
        self.instance.as_typed_ref()
    }

    /// # Safety
    ///
    /// The container must have been created with an instance of type `T`.
    pub unsafe fn instance_mut<T>(&mut self) -> &mut T {
        self.instance.as_typed_mut()
    }

    /// Moves the instance and the library reference out of the container.
    ///
    /// Returns `None` if the container only borrows its instance. The container is consumed in
    /// either case.
    ///
    /// # Safety
    ///
    /// The container must have been created with an instance of type `T`.
    pub unsafe fn into_inner<T>(self) -> Option<(T, LibArc)> {
        let Self { instance, context } = self;
        instance
            .into_typed::<T>()
            .into_inner()
            .map(|instance| (instance, context))
    }
}

bitflags::bitflags! {
    /// Capabilities a capability object was constructed with.
    #[repr(C)]
    #[derive(Default)]
    #[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
    pub struct Capabilities: u32 {
        const CLONE = 0b0000_0000_0001;
        const PHYSICAL_MEMORY = 0b0000_0000_0010;
        const MEMORY_VIEW = 0b0000_0000_0100;
        const VIRTUAL_TRANSLATE = 0b0000_0000_1000;
        const PROCESS = 0b0000_0001_0000;
        const OS = 0b0000_0010_0000;
        const OS_KEYBOARD = 0b0000_0100_0000;
        const KEYBOARD = 0b0000_1000_0000;
        const KEYBOARD_STATE = 0b0001_0000_0000;
        const CONNECTOR_CPU_STATE = 0b0010_0000_0000;
        const CPU_STATE = 0b0100_0000_0000;
    }
}

impl Capabilities {
    /// Sets `cap` if `present` is true.
    pub(crate) fn with_opt<T>(self, cap: Capabilities, present: Option<T>) -> Self {
        if present.is_some() {
            self | cap
        } else {
            self
        }
    }
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct CloneFunctionTable {
    pub clone: extern "C" fn(cont: &Container) -> Container<'static>,
}

impl CloneFunctionTable {
    pub fn of<T: Clone + Send + 'static>() -> &'static Self {
        &Self {
            clone: c_clone::<T>,
        }
    }
}

extern "C" fn c_clone<T: Clone + Send + 'static>(cont: &Container) -> Container<'static> {
    let instance = unsafe { cont.instance_ref::<T>() }.clone();
    Container::new(instance, cont.context().clone())
}

/// Maps the status code of a batch function table entry to the result of the batch trait methods.
///
/// The table entries return `-2`/`-3` when any element failed. The trait methods have already
/// reported those elements through the failure callback, so partial codes count as success here.
pub(crate) fn batch_result(res: i32) -> Result<()> {
    match part_result_from_int_void(res) {
        Err(PartialError::Error(e)) => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{batch_result, Capabilities, CloneFunctionTable, Container, LibArc};
    use crate::abi::CArc;
    use crate::error::{Error, ErrorKind, ErrorOrigin};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn owned_container_drops_instance() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cont = Container::new(Counted(drops.clone()), LibArc::none());
        assert!(cont.is_owned());
        std::mem::drop(cont);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn borrowed_container_keeps_instance() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut inst = Counted(drops.clone());
        let cont = Container::from_mut(&mut inst, LibArc::none());
        assert!(!cont.is_owned());
        assert!(unsafe { cont.into_inner::<Counted>() }.is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clone_shares_library() {
        let lib: LibArc = CArc::from(5u32).into_opaque().into();
        let cont = Container::new(7u64, lib);
        let cloned = (CloneFunctionTable::of::<u64>().clone)(&cont);
        assert_eq!(unsafe { *cloned.instance_ref::<u64>() }, 7);
        assert_eq!(
            cloned.context().as_arc().map(|a| a.as_ptr()),
            cont.context().as_arc().map(|a| a.as_ptr())
        );

        let (val, lib) = unsafe { cloned.into_inner::<u64>() }.unwrap();
        assert_eq!(val, 7);
        assert!(lib.is_some());
    }

    #[test]
    fn batch_codes() {
        assert!(batch_result(0).is_ok());
        assert!(batch_result(-2).is_ok());
        assert!(batch_result(-3).is_ok());
        let err = Error(ErrorOrigin::Connector, ErrorKind::OutOfBounds);
        assert_eq!(batch_result(err.into_i32()), Err(err));
    }

    #[test]
    fn optional_caps() {
        let caps = Capabilities::CLONE
            .with_opt(Capabilities::KEYBOARD, Some(()))
            .with_opt(Capabilities::CPU_STATE, None::<()>);
        assert!(caps.contains(Capabilities::KEYBOARD));
        assert!(!caps.contains(Capabilities::CPU_STATE));
    }
}
