/*!
Specialized `Error` and `Result` types for capflow.

Every error that crosses a plugin boundary is flattened into a single negative `i32`. The low
nibble of the negated value tells the kind of failure apart: `1` is a regular [`Error`] whose
origin and kind are packed into the upper bits, `2` is a partial read and `3` a partial write.
*/

use std::mem::MaybeUninit;
use std::{fmt, result};

use log::Level;

/// Origin and kind of a failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Error(pub ErrorOrigin, pub ErrorKind);

impl Error {
    /// Human readable kind of the error.
    pub fn as_str(&self) -> &'static str {
        self.1.to_str()
    }

    pub fn into_str(self) -> &'static str {
        self.as_str()
    }

    pub const fn into_i32(self) -> i32 {
        let origin = ((self.0 as i32 + 1) & 0xFFFi32) << 4;
        let kind = ((self.1 as i32 + 1) & 0xFFFi32) << 16;
        -(1 + origin + kind)
    }

    /// Decodes an error produced by [`Error::into_i32`].
    ///
    /// Values that do not map onto a known origin or kind decode to `Other` and `Unknown`.
    pub fn from_i32(error: i32) -> Self {
        let raw = error.checked_neg().unwrap_or(0).saturating_sub(1);
        let origin = (raw >> 4i32) & 0xFFFi32;
        let kind = (raw >> 16i32) & 0xFFFi32;

        let error_origin = (origin as usize)
            .checked_sub(1)
            .and_then(|i| ErrorOrigin::ALL.get(i))
            .copied()
            .unwrap_or(ErrorOrigin::Other);

        let error_kind = (kind as usize)
            .checked_sub(1)
            .and_then(|i| ErrorKind::ALL.get(i))
            .copied()
            .unwrap_or(ErrorKind::Unknown);

        Self(error_origin, error_kind)
    }

    /// Logs the error together with some context and hands it back, for use in `map_err`.
    pub fn log(self, level: Level, context: impl fmt::Display) -> Self {
        log::log!(level, "{} ({})", self, context);
        self
    }

    pub fn log_error(self, context: impl fmt::Display) -> Self {
        self.log(Level::Error, context)
    }

    pub fn log_warn(self, context: impl fmt::Display) -> Self {
        self.log(Level::Warn, context)
    }

    pub fn log_info(self, context: impl fmt::Display) -> Self {
        self.log(Level::Info, context)
    }

    pub fn log_debug(self, context: impl fmt::Display) -> Self {
        self.log(Level::Debug, context)
    }

    pub fn log_trace(self, context: impl fmt::Display) -> Self {
        self.log(Level::Trace, context)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.0.to_str(), self.1.to_str())
    }
}

impl std::error::Error for Error {}

impl<T> From<PartialError<T>> for Error {
    fn from(err: PartialError<T>) -> Self {
        match err {
            PartialError::Error(e) => e,
            _ => Error(ErrorOrigin::Memory, ErrorKind::PartialData),
        }
    }
}

#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorOrigin {
    Args,

    Memory,
    PhysicalMemory,
    MemoryView,
    VirtualTranslate,

    Inventory,
    Connector,
    OsLayer,
    Process,
    Keyboard,
    CpuState,
    Ffi,

    Other,
}

impl ErrorOrigin {
    /// Every origin, indexed by its discriminant.
    const ALL: &'static [ErrorOrigin] = &[
        ErrorOrigin::Args,
        ErrorOrigin::Memory,
        ErrorOrigin::PhysicalMemory,
        ErrorOrigin::MemoryView,
        ErrorOrigin::VirtualTranslate,
        ErrorOrigin::Inventory,
        ErrorOrigin::Connector,
        ErrorOrigin::OsLayer,
        ErrorOrigin::Process,
        ErrorOrigin::Keyboard,
        ErrorOrigin::CpuState,
        ErrorOrigin::Ffi,
        ErrorOrigin::Other,
    ];

    /// Returns a static string representing the origin of the error.
    pub fn to_str(self) -> &'static str {
        match self {
            ErrorOrigin::Args => "args",

            ErrorOrigin::Memory => "memory",
            ErrorOrigin::PhysicalMemory => "physical memory",
            ErrorOrigin::MemoryView => "memory view",
            ErrorOrigin::VirtualTranslate => "virtual translate",

            ErrorOrigin::Inventory => "inventory",
            ErrorOrigin::Connector => "connector",
            ErrorOrigin::OsLayer => "os layer",
            ErrorOrigin::Process => "process",
            ErrorOrigin::Keyboard => "keyboard",
            ErrorOrigin::CpuState => "cpu state",
            ErrorOrigin::Ffi => "ffi",

            ErrorOrigin::Other => "other",
        }
    }
}

#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Uninitialized,
    NotSupported,
    NotImplemented,
    Configuration,
    InvalidInput,

    ArgNotExists,
    ArgValidation,
    RequiredArgNotFound,

    PartialData,

    NotFound,
    OutOfBounds,
    Encoding,

    InvalidPath,
    UnableToReadDir,
    UnableToReadDirEntry,
    UnableToReadFile,

    InvalidMemorySize,

    UnableToLoadLibrary,
    InvalidExeFile,
    ExportsNotFound,
    VersionMismatch,
    InvalidAbi,
    AlreadyExists,
    PluginNotFound,
    UnsupportedOptionalFeature,

    ProcessNotFound,
    InvalidProcessInfo,
    ModuleNotFound,
    ExportNotFound,
    ImportNotFound,
    SectionNotFound,

    Unknown,
}

impl ErrorKind {
    /// Every kind, indexed by its discriminant.
    const ALL: &'static [ErrorKind] = &[
        ErrorKind::Uninitialized,
        ErrorKind::NotSupported,
        ErrorKind::NotImplemented,
        ErrorKind::Configuration,
        ErrorKind::InvalidInput,
        ErrorKind::ArgNotExists,
        ErrorKind::ArgValidation,
        ErrorKind::RequiredArgNotFound,
        ErrorKind::PartialData,
        ErrorKind::NotFound,
        ErrorKind::OutOfBounds,
        ErrorKind::Encoding,
        ErrorKind::InvalidPath,
        ErrorKind::UnableToReadDir,
        ErrorKind::UnableToReadDirEntry,
        ErrorKind::UnableToReadFile,
        ErrorKind::InvalidMemorySize,
        ErrorKind::UnableToLoadLibrary,
        ErrorKind::InvalidExeFile,
        ErrorKind::ExportsNotFound,
        ErrorKind::VersionMismatch,
        ErrorKind::InvalidAbi,
        ErrorKind::AlreadyExists,
        ErrorKind::PluginNotFound,
        ErrorKind::UnsupportedOptionalFeature,
        ErrorKind::ProcessNotFound,
        ErrorKind::InvalidProcessInfo,
        ErrorKind::ModuleNotFound,
        ErrorKind::ExportNotFound,
        ErrorKind::ImportNotFound,
        ErrorKind::SectionNotFound,
        ErrorKind::Unknown,
    ];

    /// Returns a static string representing the type of error.
    pub fn to_str(self) -> &'static str {
        match self {
            ErrorKind::Uninitialized => "uninitialized",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::InvalidInput => "invalid input",

            ErrorKind::ArgNotExists => "the given argument does not exist",
            ErrorKind::ArgValidation => "the argument could not be validated",
            ErrorKind::RequiredArgNotFound => "required argument is not set",

            ErrorKind::PartialData => "partial data",

            ErrorKind::NotFound => "not found",
            ErrorKind::OutOfBounds => "out of bounds",
            ErrorKind::Encoding => "encoding error",

            ErrorKind::InvalidPath => "invalid path",
            ErrorKind::UnableToReadDir => "unable to read directory",
            ErrorKind::UnableToReadDirEntry => "unable to read directory entry",
            ErrorKind::UnableToReadFile => "unable to read file",

            ErrorKind::InvalidMemorySize => "invalid memory size",

            ErrorKind::UnableToLoadLibrary => "unable to load library",
            ErrorKind::InvalidExeFile => "file is not a valid executable image",
            ErrorKind::ExportsNotFound => "file does not export any plugin descriptors",
            ErrorKind::VersionMismatch => "version mismatch",
            ErrorKind::InvalidAbi => "invalid plugin ABI",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::PluginNotFound => "plugin not found",
            ErrorKind::UnsupportedOptionalFeature => "unsupported optional feature",

            ErrorKind::ProcessNotFound => "process not found",
            ErrorKind::InvalidProcessInfo => "invalid process info",
            ErrorKind::ModuleNotFound => "module not found",
            ErrorKind::ExportNotFound => "export not found",
            ErrorKind::ImportNotFound => "import not found",
            ErrorKind::SectionNotFound => "section not found",

            ErrorKind::Unknown => "unknown error",
        }
    }
}

/// Error type for operations that may complete partially.
#[derive(Clone, Eq, PartialEq, Hash)]
pub enum PartialError<T> {
    /// Hard error, nothing usable was produced.
    Error(Error),
    /// Some of the requested reads failed. The data holds whatever could be read.
    PartialVirtualRead(T),
    /// Some of the requested writes failed.
    PartialVirtualWrite,
}

impl<T> From<Error> for PartialError<T> {
    fn from(err: Error) -> Self {
        PartialError::Error(err)
    }
}

impl<T> PartialError<T> {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartialError::Error(e) => e.as_str(),
            PartialError::PartialVirtualRead(_) => "partial virtual read",
            PartialError::PartialVirtualWrite => "partial virtual write",
        }
    }

    pub fn into_str(self) -> &'static str {
        self.as_str()
    }
}

impl<T> fmt::Debug for PartialError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string())
    }
}

impl<T> fmt::Display for PartialError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PartialError::Error(e) => fmt::Display::fmt(e, f),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl<T> std::error::Error for PartialError<T> {}

pub type Result<T> = result::Result<T, Error>;

pub type PartialResult<T> = result::Result<T, PartialError<T>>;

/// Collapsing a [`PartialResult`] into a plain [`Result`].
pub trait PartialResultExt<T> {
    /// Only complete data is `Ok`, partial success becomes [`ErrorKind::PartialData`].
    fn data(self) -> Result<T>;

    /// Partially read data counts as success.
    fn data_part(self) -> Result<T>;

    fn map_data<U, F: FnOnce(T) -> U>(self, func: F) -> PartialResult<U>;
}

impl<T> PartialResultExt<T> for PartialResult<T> {
    fn data(self) -> Result<T> {
        match self {
            Ok(data) => Ok(data),
            Err(PartialError::Error(e)) => Err(e),
            Err(_) => Err(Error(ErrorOrigin::Memory, ErrorKind::PartialData)),
        }
    }

    fn data_part(self) -> Result<T> {
        match self {
            Ok(data) => Ok(data),
            Err(PartialError::PartialVirtualRead(data)) => Ok(data),
            Err(PartialError::Error(e)) => Err(e),
            Err(PartialError::PartialVirtualWrite) => {
                Err(Error(ErrorOrigin::Memory, ErrorKind::PartialData))
            }
        }
    }

    fn map_data<U, F: FnOnce(T) -> U>(self, func: F) -> PartialResult<U> {
        match self {
            Ok(data) => Ok(func(data)),
            Err(PartialError::Error(e)) => Err(PartialError::Error(e)),
            Err(PartialError::PartialVirtualRead(data)) => {
                Err(PartialError::PartialVirtualRead(func(data)))
            }
            Err(PartialError::PartialVirtualWrite) => Err(PartialError::PartialVirtualWrite),
        }
    }
}

/// Conversion of results into the integer status codes used on the plugin boundary.
pub trait AsIntResult<T> {
    fn into_int_result(self) -> i32;
    fn into_int_out_result(self, out: &mut MaybeUninit<T>) -> i32;
}

pub fn result_from_int_void(res: i32) -> Result<()> {
    if res == 0 {
        Ok(())
    } else {
        Err(Error::from_i32(res))
    }
}

/// Builds a result from a status code and the output slot the callee filled.
///
/// The slot is only read when `res` is `0`.
pub fn result_from_int<T>(res: i32, out: MaybeUninit<T>) -> Result<T> {
    if res == 0 {
        Ok(unsafe { out.assume_init() })
    } else {
        Err(Error::from_i32(res))
    }
}

pub fn part_result_from_int_void(res: i32) -> PartialResult<()> {
    part_result_from_int(res, MaybeUninit::new(()))
}

/// Like [`result_from_int`], additionally reading the slot on a partial read (`-2`).
pub fn part_result_from_int<T>(res: i32, out: MaybeUninit<T>) -> PartialResult<T> {
    if res == 0 {
        return Ok(unsafe { out.assume_init() });
    }

    Err(match res.checked_neg().unwrap_or(0) & 0xF {
        1 => PartialError::Error(Error::from_i32(res)),
        2 => PartialError::PartialVirtualRead(unsafe { out.assume_init() }),
        3 => PartialError::PartialVirtualWrite,
        _ => PartialError::Error(Error(ErrorOrigin::Ffi, ErrorKind::Unknown)),
    })
}

impl<T> AsIntResult<T> for result::Result<T, Error> {
    fn into_int_result(self) -> i32 {
        match self {
            Ok(_) => 0,
            Err(err) => err.into_i32(),
        }
    }

    fn into_int_out_result(self, out: &mut MaybeUninit<T>) -> i32 {
        match self {
            Ok(ret) => {
                out.write(ret);
                0
            }
            Err(err) => err.into_i32(),
        }
    }
}

impl<T> AsIntResult<T> for result::Result<T, PartialError<T>> {
    fn into_int_result(self) -> i32 {
        match self {
            Ok(_) => 0,
            Err(PartialError::Error(err)) => err.into_i32(),
            Err(PartialError::PartialVirtualRead(_)) => -2,
            Err(PartialError::PartialVirtualWrite) => -3,
        }
    }

    fn into_int_out_result(self, out: &mut MaybeUninit<T>) -> i32 {
        match self {
            Ok(ret) => {
                out.write(ret);
                0
            }
            Err(PartialError::Error(err)) => err.into_i32(),
            Err(PartialError::PartialVirtualRead(ret)) => {
                out.write(ret);
                -2
            }
            Err(PartialError::PartialVirtualWrite) => -3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        part_result_from_int, part_result_from_int_void, result_from_int, result_from_int_void,
        AsIntResult, Error, ErrorKind, ErrorOrigin, PartialError, PartialResult, PartialResultExt,
        Result,
    };
    use std::mem::MaybeUninit;

    #[test]
    fn error_from_i32_invalid() {
        for code in [i32::MIN, i32::MIN + 1, -1, -2, -3, 1, 0x7FFF_FFFF] {
            let err = Error::from_i32(code);
            assert_eq!(err, Error(ErrorOrigin::Other, ErrorKind::Unknown), "{}", code);
        }
    }

    #[test]
    fn every_origin_and_kind_survives_the_boundary() {
        for &origin in ErrorOrigin::ALL {
            for &kind in ErrorKind::ALL {
                let code = Error(origin, kind).into_i32();
                assert!(code < 0);
                assert_eq!(-code & 0xF, 1);
                assert_eq!(Error::from_i32(code), Error(origin, kind));
            }
        }
    }

    #[test]
    fn discriminants_match_tables() {
        for (i, origin) in ErrorOrigin::ALL.iter().enumerate() {
            assert_eq!(*origin as usize, i);
        }
        for (i, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
        }
    }

    #[test]
    fn part_error_from_i32() {
        assert_eq!(
            part_result_from_int_void(-1),
            Err(PartialError::Error(Error(ErrorOrigin::Other, ErrorKind::Unknown)))
        );
        assert_eq!(
            part_result_from_int_void(-2),
            Err(PartialError::PartialVirtualRead(()))
        );
        assert_eq!(
            part_result_from_int_void(-3),
            Err(PartialError::PartialVirtualWrite)
        );
        assert_eq!(
            part_result_from_int_void(-4),
            Err(PartialError::Error(Error(ErrorOrigin::Ffi, ErrorKind::Unknown)))
        );
    }

    #[test]
    fn result_ok_value_ffi() {
        let r: Result<i32> = Ok(1234i32);
        let mut out = MaybeUninit::<i32>::uninit();
        let result = result_from_int(r.into_int_out_result(&mut out), out);
        assert_eq!(result, Ok(1234));
    }

    #[test]
    fn result_error_ffi() {
        let err = Error(ErrorOrigin::Inventory, ErrorKind::PluginNotFound);
        let r: Result<i32> = Err(err);
        assert_eq!(result_from_int_void(r.into_int_result()), Err(err));

        let mut out = MaybeUninit::<i32>::uninit();
        let r: Result<i32> = Err(err);
        assert_eq!(result_from_int(r.into_int_out_result(&mut out), out), Err(err));
    }

    #[test]
    fn part_result_ffi() {
        let r: PartialResult<i32> = Err(PartialError::PartialVirtualRead(1234i32));
        let mut out = MaybeUninit::<i32>::uninit();
        let result = part_result_from_int(r.into_int_out_result(&mut out), out);
        assert_eq!(result, Err(PartialError::PartialVirtualRead(1234i32)));

        let r: PartialResult<i32> = Err(PartialError::PartialVirtualWrite);
        assert_eq!(r.into_int_result(), -3);

        let r: PartialResult<()> = Ok(());
        assert!(part_result_from_int_void(r.into_int_result()).is_ok());
    }

    #[test]
    fn partial_data_extraction() {
        let r: PartialResult<u8> = Err(PartialError::PartialVirtualRead(7));
        assert_eq!(r.clone().data_part(), Ok(7));
        assert_eq!(
            r.clone().data(),
            Err(Error(ErrorOrigin::Memory, ErrorKind::PartialData))
        );
        assert_eq!(
            r.map_data(|v| v * 2),
            Err(PartialError::PartialVirtualRead(14))
        );
    }

    #[test]
    fn display() {
        let err = Error(ErrorOrigin::Inventory, ErrorKind::PluginNotFound);
        assert_eq!(err.to_string(), "inventory: plugin not found");
        assert_eq!(
            PartialError::<()>::Error(err).to_string(),
            "inventory: plugin not found"
        );
    }
}
