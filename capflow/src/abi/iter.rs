//! Pull-style lazy iterator that can cross an ABI boundary.

use crate::abi::c_void;
use std::mem::MaybeUninit;

/// FFI-safe iterator.
///
/// Wraps a mutable reference to any Rust iterator together with a monomorphized `next` function.
/// The function writes the next element into `out` and returns `0`, or returns `1` once the
/// underlying iterator is exhausted.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct CIterator<'a, T> {
    iter: &'a mut c_void,
    func: extern "C" fn(&mut c_void, out: &mut MaybeUninit<T>) -> i32,
}

impl<'a, I: Iterator<Item = T>, T> From<&'a mut I> for CIterator<'a, T> {
    fn from(iter: &'a mut I) -> Self {
        CIterator::new(iter)
    }
}

impl<'a, T> CIterator<'a, T> {
    pub fn new<I: Iterator<Item = T>>(iter: &'a mut I) -> Self {
        extern "C" fn func<I: Iterator<Item = T>, T>(
            iter: &mut I,
            out: &mut MaybeUninit<T>,
        ) -> i32 {
            match iter.next() {
                Some(e) => {
                    out.write(e);
                    0
                }
                None => 1,
            }
        }

        // SAFETY: the erased function is only ever called with the iterator it was created for
        let iter = unsafe { &mut *(iter as *mut I as *mut c_void) };
        let func = func::<I, T> as extern "C" fn(&mut I, &mut MaybeUninit<T>) -> i32;
        let func = unsafe {
            std::mem::transmute::<
                extern "C" fn(&mut I, &mut MaybeUninit<T>) -> i32,
                extern "C" fn(&mut c_void, &mut MaybeUninit<T>) -> i32,
            >(func)
        };

        Self { iter, func }
    }
}

impl<'a, T> Iterator for CIterator<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let mut out = MaybeUninit::uninit();
        if (self.func)(self.iter, &mut out) == 0 {
            Some(unsafe { out.assume_init() })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CIterator;

    #[test]
    fn yields_in_order() {
        let mut src = (0..4).map(|i| i * 2);
        let iter: CIterator<i32> = (&mut src).into();
        assert_eq!(iter.collect::<Vec<_>>(), vec![0, 2, 4, 6]);
    }

    #[test]
    fn lazy_and_single_pass() {
        let mut produced = 0;
        let mut src = std::iter::from_fn(|| {
            produced += 1;
            Some(produced)
        });
        let mut iter = CIterator::new(&mut src);
        assert_eq!(iter.next(), Some(1));
        assert_eq!(iter.next(), Some(2));
        std::mem::drop(iter);
        assert_eq!(produced, 2);
    }

    #[test]
    fn owned_items() {
        let mut src = vec![String::from("a"), String::from("bc")].into_iter();
        let iter = CIterator::new(&mut src);
        assert_eq!(iter.map(|s| s.len()).sum::<usize>(), 3);
    }
}
