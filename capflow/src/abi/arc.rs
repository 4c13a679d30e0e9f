/*!
FFI-safe reference counted handles.

`CArc` is a thin wrapper around `std::sync::Arc`: the pointer it carries is the one returned by
`Arc::into_raw`, and the clone/drop functions next to it increment and decrement the strong count of
that very `Arc`. Carrying the functions with the pointer lets the other side of a library boundary
clone and release the handle without knowing the layout of `Arc` in the binary that created it.

A handle whose functions were taken (see [`CArc::forget`]) is empty. Dropping an empty handle does
nothing, so dropping twice after a forget is not a double free.
*/

use crate::abi::c_void;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::sync::Arc;

unsafe extern "C" fn c_clone<T>(ptr: *const c_void) -> *const c_void {
    Arc::increment_strong_count(ptr as *const T);
    ptr
}

unsafe extern "C" fn c_drop<T>(ptr: *const c_void) {
    Arc::decrement_strong_count(ptr as *const T);
}

/// FFI-safe `Arc`.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct CArc<T> {
    instance: *const c_void,
    clone_fn: Option<unsafe extern "C" fn(*const c_void) -> *const c_void>,
    drop_fn: Option<unsafe extern "C" fn(*const c_void)>,
    _phantom: PhantomData<T>,
}

unsafe impl<T: Sync + Send> Send for CArc<T> {}
unsafe impl<T: Sync + Send> Sync for CArc<T> {}

impl<T> From<T> for CArc<T> {
    fn from(obj: T) -> Self {
        Arc::new(obj).into()
    }
}

impl<T> From<Arc<T>> for CArc<T> {
    fn from(arc: Arc<T>) -> Self {
        Self {
            instance: Arc::into_raw(arc) as *const c_void,
            clone_fn: Some(c_clone::<T>),
            drop_fn: Some(c_drop::<T>),
            _phantom: PhantomData,
        }
    }
}

impl<T> CArc<T> {
    /// Erases the type of the shared object.
    ///
    /// The clone and drop functions stay attached, so the opaque handle still releases the object
    /// correctly.
    pub fn into_opaque(self) -> CArc<c_void> {
        let this = ManuallyDrop::new(self);
        CArc {
            instance: this.instance,
            clone_fn: this.clone_fn,
            drop_fn: this.drop_fn,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the shared object, if the handle is not empty.
    pub fn as_ref(&self) -> Option<&T> {
        if self.drop_fn.is_some() {
            Some(unsafe { &*(self.instance as *const T) })
        } else {
            None
        }
    }
}

impl CArc<c_void> {
    /// Restores the concrete type of an opaque handle.
    ///
    /// # Safety
    ///
    /// The handle must have been created from a `CArc<T>` of the same `T`.
    pub unsafe fn into_typed<T>(self) -> CArc<T> {
        let this = ManuallyDrop::new(self);
        CArc {
            instance: this.instance,
            clone_fn: this.clone_fn,
            drop_fn: this.drop_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T> CArc<T> {
    /// Returns the raw pointer to the shared object.
    pub fn as_ptr(&self) -> *const c_void {
        self.instance
    }

    /// Detaches the handle from the shared object without releasing its reference.
    ///
    /// The handle is left empty and its drop becomes a no-op. The returned pointer still owns one
    /// strong reference that has to be released by whoever takes it over.
    pub fn forget(&mut self) -> *const c_void {
        self.clone_fn = None;
        self.drop_fn = None;
        std::mem::replace(&mut self.instance, std::ptr::null())
    }

    /// Returns `true` if this handle no longer refers to anything.
    pub fn is_empty(&self) -> bool {
        self.drop_fn.is_none()
    }
}

impl<T> Clone for CArc<T> {
    fn clone(&self) -> Self {
        Self {
            instance: match self.clone_fn {
                Some(clone_fn) => unsafe { clone_fn(self.instance) },
                None => self.instance,
            },
            clone_fn: self.clone_fn,
            drop_fn: self.drop_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T> Drop for CArc<T> {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn.take() {
            unsafe { drop_fn(self.instance) }
        }
    }
}

impl<T> Deref for CArc<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        debug_assert!(!self.is_empty(), "dereferenced an empty CArc");
        unsafe { &*(self.instance as *const T) }
    }
}

/// FFI-safe `Option<CArc<T>>`.
///
/// Same layout as `CArc`, the empty state (no drop function) encodes `None`.
#[repr(transparent)]
#[derive(::abi_stable::StableAbi)]
pub struct COptArc<T>(CArc<T>);

unsafe impl<T: Sync + Send> Send for COptArc<T> {}
unsafe impl<T: Sync + Send> Sync for COptArc<T> {}

impl<T> COptArc<T> {
    pub fn none() -> Self {
        Self(CArc {
            instance: std::ptr::null(),
            clone_fn: None,
            drop_fn: None,
            _phantom: PhantomData,
        })
    }

    pub fn is_some(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_arc(&self) -> Option<&CArc<T>> {
        if self.is_some() {
            Some(&self.0)
        } else {
            None
        }
    }

    /// Takes the handle out, leaving `None` behind.
    pub fn take(&mut self) -> Option<CArc<T>> {
        std::mem::replace(self, Self::none()).into()
    }
}

impl<T> COptArc<T> {
    pub fn as_ref(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn into_opaque(self) -> COptArc<c_void> {
        COptArc(self.0.into_opaque())
    }
}

impl<T> Default for COptArc<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> Clone for COptArc<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> From<CArc<T>> for COptArc<T> {
    fn from(arc: CArc<T>) -> Self {
        Self(arc)
    }
}

impl<T> From<Option<CArc<T>>> for COptArc<T> {
    fn from(arc: Option<CArc<T>>) -> Self {
        arc.map(Self).unwrap_or_else(Self::none)
    }
}

impl<T> From<COptArc<T>> for Option<CArc<T>> {
    fn from(arc: COptArc<T>) -> Self {
        if arc.is_some() {
            Some(arc.0)
        } else {
            None
        }
    }
}

// `Option<Arc<T>>` takes up one pointer of storage and both wrappers share the exact same layout
const _: [(); std::mem::size_of::<Option<Arc<u64>>>()] = [(); std::mem::size_of::<*const u64>()];
const _: [(); std::mem::size_of::<CArc<u64>>()] = [(); std::mem::size_of::<COptArc<u64>>()];
const _: [(); std::mem::size_of::<CArc<u64>>()] = [(); std::mem::size_of::<*const u64>() * 3];
