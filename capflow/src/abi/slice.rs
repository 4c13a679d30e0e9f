//! FFI-safe slices.
//!
//! Both slice types are a plain (pointer, length) pair carrying the borrow lifetime of the slice
//! they were created from.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Immutable FFI-safe slice.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct CSliceRef<'a, T> {
    data: *const T,
    len: usize,
    _lifetime: PhantomData<&'a T>,
}

unsafe impl<'a, T: Sync> Send for CSliceRef<'a, T> {}
unsafe impl<'a, T: Sync> Sync for CSliceRef<'a, T> {}

impl<T> Clone for CSliceRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CSliceRef<'_, T> {}

impl<'a, T> CSliceRef<'a, T> {
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn as_ptr(&self) -> *const T {
        self.data
    }

    /// Converts back into a native slice with the original lifetime.
    pub fn as_slice(&self) -> &'a [T] {
        if self.len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.data, self.len) }
        }
    }
}

impl<'a> CSliceRef<'a, u8> {
    /// Creates a byte slice from a string. Usable in `static` initializers.
    pub const fn from_str(s: &'a str) -> Self {
        Self {
            data: s.as_ptr(),
            len: s.len(),
            _lifetime: PhantomData,
        }
    }

    /// Reinterprets the bytes as a string slice.
    ///
    /// # Safety
    ///
    /// The bytes must be valid UTF-8. This holds for every slice created through
    /// [`CSliceRef::from_str`].
    pub unsafe fn into_str(self) -> &'a str {
        std::str::from_utf8_unchecked(self.as_slice())
    }

    /// Reinterprets the bytes as a string slice, checking for valid UTF-8.
    pub fn to_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.as_slice()).ok()
    }
}

impl<'a, T> From<&'a [T]> for CSliceRef<'a, T> {
    fn from(s: &'a [T]) -> Self {
        Self {
            data: s.as_ptr(),
            len: s.len(),
            _lifetime: PhantomData,
        }
    }
}

impl<'a> From<&'a str> for CSliceRef<'a, u8> {
    fn from(s: &'a str) -> Self {
        Self::from_str(s)
    }
}

impl<'a, T> Deref for CSliceRef<'a, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CSliceRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Mutable FFI-safe slice.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct CSliceMut<'a, T> {
    data: *mut T,
    len: usize,
    _lifetime: PhantomData<&'a mut T>,
}

unsafe impl<'a, T: Send> Send for CSliceMut<'a, T> {}
unsafe impl<'a, T: Sync> Sync for CSliceMut<'a, T> {}

impl<'a, T> CSliceMut<'a, T> {
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.data
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.data
    }

    /// Converts back into a native mutable slice with the original lifetime.
    pub fn into_slice(self) -> &'a mut [T] {
        if self.len == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
        }
    }
}

impl<'a, T> From<&'a mut [T]> for CSliceMut<'a, T> {
    fn from(s: &'a mut [T]) -> Self {
        Self {
            data: s.as_mut_ptr(),
            len: s.len(),
            _lifetime: PhantomData,
        }
    }
}

impl<'a, T> Deref for CSliceMut<'a, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        if self.len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.data, self.len) }
        }
    }
}

impl<'a, T> DerefMut for CSliceMut<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        if self.len == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CSliceMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{CSliceMut, CSliceRef};

    #[test]
    fn str_roundtrip() {
        static NAME: CSliceRef<'static, u8> = CSliceRef::from_str("dummy");
        assert_eq!(unsafe { NAME.into_str() }, "dummy");
        assert_eq!(NAME.to_str(), Some("dummy"));
    }

    #[test]
    fn mut_slice_writes_through() {
        let mut buf = [0u8; 4];
        let mut slice: CSliceMut<u8> = buf.as_mut().into();
        slice[2] = 7;
        slice.into_slice()[3] = 9;
        assert_eq!(buf, [0, 0, 7, 9]);
    }

    #[test]
    fn empty_slices() {
        let slice: CSliceRef<u32> = (&[][..]).into();
        assert!(slice.is_empty());
        assert_eq!(slice.as_slice(), &[] as &[u32]);
    }
}
