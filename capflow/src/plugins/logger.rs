//! Logger handed to plugins.
//!
//! A plugin library carries its own copy of the `log` crate, records logged inside of it would be
//! lost without installing a backend there. [`PluginLogger`] is that backend: it is created by the
//! host, passed to the create function of the plugin and forwards every record back to the
//! logger of the host.

use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};

use log::{Level, LevelFilter, SetLoggerError};

use crate::abi::{COption, CSliceRef};

/// FFI-Safe representation of log::Metadata
#[repr(C)]
pub struct Metadata<'a> {
    level: Level,
    target: CSliceRef<'a, u8>,
}

/// FFI-Safe representation of log::Record
///
/// The message is formatted on the plugin side.
#[repr(C)]
pub struct Record<'a> {
    metadata: Metadata<'a>,
    message: CSliceRef<'a, u8>,
    module_path: COption<CSliceRef<'a, u8>>,
    file: COption<CSliceRef<'a, u8>>,
    line: COption<u32>,
}

type SetMaxLevelFn = extern "C" fn(LevelFilter);

/// Forwards logging calls from a plugin to the host.
#[repr(C)]
pub struct PluginLogger {
    max_level: LevelFilter,
    enabled: extern "C" fn(metadata: &Metadata) -> bool,
    log: extern "C" fn(record: &Record),
    flush: extern "C" fn(),
    on_level_change: AtomicPtr<c_void>,
}

impl PluginLogger {
    /// Creates a logger capturing the current maximum level of the host.
    ///
    /// Has to be called on the host side.
    pub fn new() -> Self {
        Self {
            max_level: log::max_level(),
            enabled: cf_log_enabled,
            log: cf_log_log,
            flush: cf_log_flush,
            on_level_change: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Maximum level the host had when the logger was created.
    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Installs the logger as the `log` backend of the plugin.
    ///
    /// Has to be called on the plugin side. Also registers the hook through which the host
    /// updates the level of the plugin later on.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        let val: SetMaxLevelFn = cf_log_set_max_level;
        self.on_level_change
            .store(val as *const c_void as *mut c_void, Ordering::SeqCst);
        log::set_max_level(self.max_level);
        log::set_logger(self)?;
        Ok(())
    }

    /// Forwards a new maximum level from the host to the plugin.
    ///
    /// Does nothing if the plugin never initialized the logger.
    pub fn on_level_change(&self, new_level: LevelFilter) {
        let val = self.on_level_change.load(Ordering::Relaxed);
        if !val.is_null() {
            let on_change = unsafe { std::mem::transmute::<*mut c_void, SetMaxLevelFn>(val) };
            on_change(new_level);
        }
    }
}

impl Default for PluginLogger {
    fn default() -> Self {
        PluginLogger::new()
    }
}

impl log::Log for PluginLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        let m = Metadata {
            level: metadata.level(),
            target: metadata.target().into(),
        };
        (self.enabled)(&m)
    }

    fn log(&self, record: &log::Record) {
        let message = record.args().to_string();
        let r = Record {
            metadata: Metadata {
                level: record.metadata().level(),
                target: record.metadata().target().into(),
            },
            message: message.as_str().into(),
            module_path: record.module_path().map(|s| s.into()).into(),
            file: record.file().map(|s| s.into()).into(),
            line: record.line().into(),
        };
        (self.log)(&r)
    }

    fn flush(&self) {
        (self.flush)()
    }
}

// invoked from the host on the plugin side
extern "C" fn cf_log_set_max_level(level: LevelFilter) {
    log::set_max_level(level);
}

// invoked from the plugin on the host side
extern "C" fn cf_log_enabled(metadata: &Metadata) -> bool {
    log::logger().enabled(
        &log::Metadata::builder()
            .level(metadata.level)
            .target(metadata.target.to_str().unwrap_or_default())
            .build(),
    )
}

fn opt_str<'a>(s: &COption<CSliceRef<'a, u8>>) -> Option<&'a str> {
    s.as_ref().and_then(|s| s.to_str())
}

extern "C" fn cf_log_log(record: &Record) {
    log::logger().log(
        &log::Record::builder()
            .metadata(
                log::Metadata::builder()
                    .level(record.metadata.level)
                    .target(record.metadata.target.to_str().unwrap_or_default())
                    .build(),
            )
            .args(format_args!(
                "{}",
                record.message.to_str().unwrap_or_default()
            ))
            .module_path(opt_str(&record.module_path))
            .file(opt_str(&record.file))
            .line(record.line.as_ref().copied())
            .build(),
    )
}

extern "C" fn cf_log_flush() {
    log::logger().flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn level_change_before_init_is_ignored() {
        let logger = PluginLogger::new();
        logger.on_level_change(LevelFilter::Trace);
    }

    #[test]
    fn forwards_records_to_host() {
        let logger = PluginLogger::new();
        logger.log(
            &log::Record::builder()
                .level(Level::Info)
                .target("capflow::test")
                .args(format_args!("hello {}", 5))
                .line(Some(10))
                .build(),
        );
        logger.flush();
    }
}
