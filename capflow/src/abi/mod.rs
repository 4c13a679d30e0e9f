/*!
FFI-safe building blocks every capability interface is made of.

Everything in here has a stable `#[repr(C)]` layout and can be passed through an `extern "C"`
boundary as-is. Inside Rust they behave like the std types they mirror: `CArc` like `Arc`, `CBox`
like `Box`, `CIterator` like any `Iterator` and `OpaqueCallback` like a `FnMut(T) -> bool`.
*/

/// Opaque type standing in for `std::ffi::c_void` in `StableAbi` types.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
#[allow(non_camel_case_types)]
pub struct c_void {
    _p: [u8; 0],
}

pub mod arc;
pub use arc::{CArc, COptArc};

pub mod boxed;
pub use boxed::CBox;

pub mod callback;
pub use callback::{opt_call, Callback, FeedCallback, OpaqueCallback};

pub mod iter;
pub use iter::CIterator;

pub mod option;
pub use option::COption;

pub mod repr_cstr;
pub use repr_cstr::ReprCString;

pub mod slice;
pub use slice::{CSliceMut, CSliceRef};

pub mod tuple;
pub use tuple::{CTup2, CTup3};
