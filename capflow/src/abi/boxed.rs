/*!
FFI-safe owned (or borrowed) instance box.

A `CBox` created from a `Box<T>` owns its instance and carries the function that frees it. A
`CBox` created from a `&mut T` only borrows: it has no drop function and never frees anything.
*/

use crate::abi::c_void;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

unsafe extern "C" fn c_drop<T>(ptr: *mut c_void) {
    std::mem::drop(Box::from_raw(ptr as *mut T));
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct CBox<'a, T> {
    instance: *mut c_void,
    drop_fn: Option<unsafe extern "C" fn(*mut c_void)>,
    _phantom: PhantomData<&'a mut T>,
}

unsafe impl<'a, T: Send> Send for CBox<'a, T> {}

impl<'a, T: 'a> From<Box<T>> for CBox<'a, T> {
    fn from(b: Box<T>) -> Self {
        Self {
            instance: Box::into_raw(b) as *mut c_void,
            drop_fn: Some(c_drop::<T>),
            _phantom: PhantomData,
        }
    }
}

impl<'a, T> From<&'a mut T> for CBox<'a, T> {
    fn from(instance: &'a mut T) -> Self {
        Self {
            instance: instance as *mut T as *mut c_void,
            drop_fn: None,
            _phantom: PhantomData,
        }
    }
}

impl<'a, T> CBox<'a, T> {
    /// Erases the type of the instance.
    pub fn into_opaque(self) -> CBox<'a, c_void> {
        let this = ManuallyDrop::new(self);
        CBox {
            instance: this.instance,
            drop_fn: this.drop_fn,
            _phantom: PhantomData,
        }
    }

    /// Returns `true` if dropping this box frees the instance.
    pub fn is_owned(&self) -> bool {
        self.drop_fn.is_some()
    }

    /// Returns `true` if the box was forgotten and no longer refers to an instance.
    pub fn is_null(&self) -> bool {
        self.instance.is_null()
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.instance
    }

    /// Extracts the raw instance pointer and nulls the box.
    ///
    /// Dropping the box afterwards is a no-op. Ownership of the instance (if the box was owning)
    /// passes to the caller.
    pub fn forget(&mut self) -> *mut c_void {
        self.drop_fn = None;
        std::mem::replace(&mut self.instance, std::ptr::null_mut())
    }

    /// Moves the instance out of an owning box.
    ///
    /// Returns `None` (and leaves the instance untouched) if the box only borrows.
    pub fn into_inner(self) -> Option<T> {
        let mut this = ManuallyDrop::new(self);
        if this.is_owned() && !this.is_null() {
            let ptr = this.forget();
            Some(*unsafe { Box::from_raw(ptr as *mut T) })
        } else {
            None
        }
    }
}

impl<'a> CBox<'a, c_void> {
    /// Restores the concrete type of an opaque box.
    ///
    /// # Safety
    ///
    /// The box must have been created from a `CBox<T>` of the same `T`.
    pub unsafe fn into_typed<T>(self) -> CBox<'a, T> {
        let this = ManuallyDrop::new(self);
        CBox {
            instance: this.instance,
            drop_fn: this.drop_fn,
            _phantom: PhantomData,
        }
    }

    /// # Safety
    ///
    /// The box must contain a `T` and must not be null.
    pub unsafe fn as_typed_ref<T>(&self) -> &T {
        &*(self.instance as *const T)
    }

    /// # Safety
    ///
    /// The box must contain a `T` and must not be null.
    pub unsafe fn as_typed_mut<T>(&mut self) -> &mut T {
        &mut *(self.instance as *mut T)
    }
}

impl<T> Deref for CBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        debug_assert!(!self.is_null(), "dereferenced a forgotten CBox");
        unsafe { &*(self.instance as *const T) }
    }
}

impl<T> DerefMut for CBox<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        debug_assert!(!self.is_null(), "dereferenced a forgotten CBox");
        unsafe { &mut *(self.instance as *mut T) }
    }
}

impl<T> Drop for CBox<'_, T> {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn.take() {
            unsafe { drop_fn(self.instance) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CBox;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DropCounter(Arc<AtomicUsize>, u32);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn owned_drops_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let b = CBox::from(Box::new(DropCounter(drops.clone(), 1))).into_opaque();
        assert!(b.is_owned());
        std::mem::drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn borrowed_never_drops() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut counter = DropCounter(drops.clone(), 2);
        {
            let mut b = CBox::from(&mut counter);
            b.1 = 3;
            assert!(!b.is_owned());
            assert!(b.into_inner().is_none());
        }
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(counter.1, 3);
    }

    #[test]
    fn forget_then_drop_is_noop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut b = CBox::from(Box::new(DropCounter(drops.clone(), 4)));
        let raw = b.forget();
        assert!(b.is_null());
        std::mem::drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        std::mem::drop(unsafe { Box::from_raw(raw as *mut DropCounter) });
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn into_inner_transfers_ownership() {
        let drops = Arc::new(AtomicUsize::new(0));
        let b = CBox::from(Box::new(DropCounter(drops.clone(), 5))).into_opaque();
        let inner = unsafe { b.into_typed::<DropCounter>() }.into_inner().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(inner.1, 5);
        std::mem::drop(inner);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
