use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Owned, null-terminated, FFI-safe string.
///
/// Used for every name that crosses the plugin boundary by value (process and module names, help
/// texts, target names). Interior null bytes truncate the string.
#[repr(transparent)]
#[derive(::abi_stable::StableAbi)]
pub struct ReprCString(*mut c_char);

unsafe impl Send for ReprCString {}
unsafe impl Sync for ReprCString {}

impl ReprCString {
    pub fn as_str(&self) -> &str {
        unsafe { CStr::from_ptr(self.0) }.to_str().unwrap_or_default()
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.0
    }
}

impl From<&str> for ReprCString {
    fn from(from: &str) -> Self {
        let bytes = from.bytes().take_while(|&b| b != 0).collect::<Vec<_>>();
        // interior nulls were stripped above
        let cstr = CString::new(bytes).unwrap_or_default();
        Self(cstr.into_raw())
    }
}

impl From<String> for ReprCString {
    fn from(from: String) -> Self {
        from.as_str().into()
    }
}

impl AsRef<str> for ReprCString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::ops::Deref for ReprCString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl Drop for ReprCString {
    fn drop(&mut self) {
        let _ = unsafe { CString::from_raw(self.0) };
    }
}

impl Clone for ReprCString {
    fn clone(&self) -> Self {
        self.as_str().into()
    }
}

impl Default for ReprCString {
    fn default() -> Self {
        "".into()
    }
}

impl PartialEq for ReprCString {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ReprCString {}

impl std::hash::Hash for ReprCString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl std::fmt::Display for ReprCString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for ReprCString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReprCString").field(&self.as_str()).finish()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ReprCString {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ReprCString {
    fn deserialize<D>(deserializer: D) -> std::result::Result<ReprCString, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ReprCStringVisitor;

        impl<'de> ::serde::de::Visitor<'de> for ReprCStringVisitor {
            type Value = ReprCString;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: ::serde::de::Error,
            {
                Ok(v.into())
            }
        }

        deserializer.deserialize_str(ReprCStringVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::ReprCString;

    #[test]
    fn from_str() {
        let s = ReprCString::from("ntoskrnl.exe");
        assert_eq!(s.as_str(), "ntoskrnl.exe");
        assert_eq!(s.clone(), s);
    }

    #[test]
    fn interior_null_truncates() {
        let s = ReprCString::from("abc\0def");
        assert_eq!(&*s, "abc");
    }

    #[test]
    fn empty() {
        let s = ReprCString::default();
        assert!(s.is_empty());
        assert_eq!(s.to_string(), "");
    }
}
