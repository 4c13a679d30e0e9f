//! FFI-safe tuples.

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct CTup2<A, B>(pub A, pub B);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub struct CTup3<A, B, C>(pub A, pub B, pub C);

impl<A, B> From<(A, B)> for CTup2<A, B> {
    fn from((a, b): (A, B)) -> Self {
        Self(a, b)
    }
}

impl<A, B> From<CTup2<A, B>> for (A, B) {
    fn from(CTup2(a, b): CTup2<A, B>) -> Self {
        (a, b)
    }
}

impl<A, B, C> From<(A, B, C)> for CTup3<A, B, C> {
    fn from((a, b, c): (A, B, C)) -> Self {
        Self(a, b, c)
    }
}

impl<A, B, C> From<CTup3<A, B, C>> for (A, B, C) {
    fn from(CTup3(a, b, c): CTup3<A, B, C>) -> Self {
        (a, b, c)
    }
}
