//! Push-style callbacks that can cross an ABI boundary.
//!
//! A callback accepts one item at a time and returns whether the producer should keep going.
//! Returning `false` is how "find first" style lookups stop an enumeration early.

use crate::abi::c_void;

/// Typed callback: a context and a function receiving it along with one item.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct Callback<'a, T, F> {
    context: &'a mut T,
    func: extern "C" fn(&mut T, F) -> bool,
}

/// Callback with an erased context type, the form every vtable accepts.
#[repr(transparent)]
#[derive(::abi_stable::StableAbi)]
pub struct OpaqueCallback<'a, T>(Callback<'a, c_void, T>);

impl<'a, T, F> Callback<'a, T, F> {
    pub fn new(context: &'a mut T, func: extern "C" fn(&mut T, F) -> bool) -> Self {
        Self { context, func }
    }

    pub fn into_opaque(self) -> OpaqueCallback<'a, F> {
        OpaqueCallback(Callback {
            context: unsafe { &mut *(self.context as *mut T as *mut c_void) },
            func: unsafe {
                std::mem::transmute::<
                    extern "C" fn(&mut T, F) -> bool,
                    extern "C" fn(&mut c_void, F) -> bool,
                >(self.func)
            },
        })
    }
}

impl<'a, T, F> From<Callback<'a, T, F>> for OpaqueCallback<'a, F> {
    fn from(callback: Callback<'a, T, F>) -> Self {
        callback.into_opaque()
    }
}

impl<T> OpaqueCallback<'_, T> {
    /// Feeds one item, returns `false` if the receiver wants no more.
    #[must_use = "the return value tells whether to keep producing items"]
    pub fn call(&mut self, arg: T) -> bool {
        (self.0.func)(self.0.context, arg)
    }
}

impl<'a, T: FnMut(F) -> bool, F> From<&'a mut T> for OpaqueCallback<'a, F> {
    fn from(func: &'a mut T) -> Self {
        extern "C" fn callback<T: FnMut(F) -> bool, F>(func: &mut T, data: F) -> bool {
            func(data)
        }

        Callback::new(func, callback::<T, F>).into()
    }
}

impl<'a, T> From<&'a mut Vec<T>> for OpaqueCallback<'a, T> {
    fn from(vec: &'a mut Vec<T>) -> Self {
        extern "C" fn callback<T>(v: &mut Vec<T>, data: T) -> bool {
            v.push(data);
            true
        }

        Callback::new(vec, callback::<T>).into()
    }
}

impl<'a, T> std::iter::Extend<T> for OpaqueCallback<'a, T> {
    fn extend<F: IntoIterator<Item = T>>(&mut self, iter: F) {
        for item in iter {
            if !self.call(item) {
                break;
            }
        }
    }
}

/// Pushes iterator items into a callback until either side is done.
pub trait FeedCallback<T> {
    fn feed_into_mut(self, callback: &mut OpaqueCallback<T>) -> usize;

    /// Returns the number of items the callback accepted.
    fn feed_into(self, mut callback: OpaqueCallback<T>) -> usize
    where
        Self: Sized,
    {
        self.feed_into_mut(&mut callback)
    }
}

impl<I: IntoIterator<Item = T>, T> FeedCallback<T> for I {
    fn feed_into_mut(self, callback: &mut OpaqueCallback<T>) -> usize {
        let mut cnt = 0;
        for item in self {
            cnt += 1;
            if !callback.call(item) {
                break;
            }
        }
        cnt
    }
}

/// Calls an optional callback, treating a missing one as "keep going".
pub fn opt_call<T>(cb: Option<&mut OpaqueCallback<'_, T>>, data: T) -> bool {
    match cb {
        Some(cb) => cb.call(data),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{FeedCallback, OpaqueCallback};

    #[test]
    fn closure_sees_every_item() {
        let mut seen = vec![];
        let mut f = |v: u32| {
            seen.push(v);
            true
        };
        let cb: OpaqueCallback<u32> = (&mut f).into();
        assert_eq!((0..5).feed_into(cb), 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn early_exit() {
        let mut calls = 0;
        let mut f = |_: u64| {
            calls += 1;
            calls < 3
        };
        let cb: OpaqueCallback<u64> = (&mut f).into();
        assert_eq!((0..10).feed_into(cb), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn vec_collects() {
        let mut out = vec![];
        let mut cb: OpaqueCallback<&str> = (&mut out).into();
        cb.extend(["a", "b"]);
        assert_eq!(out, vec!["a", "b"]);
    }
}
