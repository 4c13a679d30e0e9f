/// Describes a FFI safe option
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(::abi_stable::StableAbi)]
pub enum COption<T> {
    None,
    Some(T),
}

impl<T> Default for COption<T> {
    fn default() -> Self {
        Self::None
    }
}

impl<T> From<Option<T>> for COption<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            None => Self::None,
            Some(t) => Self::Some(t),
        }
    }
}

impl<T> From<COption<T>> for Option<T> {
    fn from(opt: COption<T>) -> Self {
        match opt {
            COption::None => None,
            COption::Some(t) => Some(t),
        }
    }
}

impl<T> COption<T> {
    pub const fn is_some(&self) -> bool {
        matches!(*self, COption::Some(_))
    }

    pub const fn is_none(&self) -> bool {
        !self.is_some()
    }

    pub const fn as_ref(&self) -> Option<&T> {
        match *self {
            COption::Some(ref x) => Some(x),
            COption::None => None,
        }
    }

    pub fn as_mut(&mut self) -> Option<&mut T> {
        match *self {
            COption::Some(ref mut x) => Some(x),
            COption::None => None,
        }
    }

    /// Takes the value out, leaving `None` in its place.
    pub fn take(&mut self) -> Option<T> {
        std::mem::take(self).into()
    }
}

#[cfg(test)]
mod tests {
    use super::COption;

    #[test]
    fn take_leaves_none() {
        let mut opt = COption::Some(5u32);
        assert_eq!(opt.take(), Some(5));
        assert!(opt.is_none());
        assert_eq!(opt.take(), None);
    }
}
