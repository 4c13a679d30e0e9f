//! OS layer capability objects and plugin glue.

pub mod instance;
pub mod keyboard;
pub mod process;

use std::mem::MaybeUninit;

use log::error;

use super::args::OsArgs;
use super::connector::ConnectorInstance;
use super::container::LibArc;
use super::{create_instance, Loadable, PluginDescriptor, PluginLogger};
use crate::abi::{COption, CSliceRef};
use crate::error::{ErrorOrigin, Result};

#[doc(hidden)]
pub use instance::{OsFunctionTable, OsGroup, OsInstance};
#[doc(hidden)]
pub use keyboard::{
    IntoKeyboardInstance, KeyboardFunctionTable, KeyboardInstance, KeyboardStateFunctionTable,
    KeyboardStateInstance, OsKeyboardFunctionTable,
};
#[doc(hidden)]
pub use process::{IntoProcessInstance, ProcessFunctionTable, ProcessGroup, ProcessInstance};

pub type OsDescriptor = PluginDescriptor<LoadableOs>;

/// OS layer plugins, built on top of a connector.
pub struct LoadableOs;

impl Loadable for LoadableOs {
    type Instance = OsInstance;
    type Input = ConnectorInstance;

    fn export_prefix() -> &'static str {
        "CAPFLOW_OS_"
    }

    fn plugin_type() -> &'static str {
        "Os"
    }

    fn origin() -> ErrorOrigin {
        ErrorOrigin::OsLayer
    }
}

/// Plugin side of an OS create function.
///
/// Parses the arguments, runs `create_fn` and writes the wrapped OS into `out`. A connector the
/// OS did not take is left in `input`, so the caller gets it back on failure.
pub fn create_os<T: OsGroup>(
    args: CSliceRef<u8>,
    input: &mut COption<ConnectorInstance>,
    lib: LibArc,
    logger: Option<&'static PluginLogger>,
    out: &mut MaybeUninit<OsInstance>,
    create_fn: impl FnOnce(&OsArgs, &mut Option<ConnectorInstance>) -> Result<T>,
) -> i32 {
    create_instance(args, input, logger, out, |args, input| {
        create_fn(args, input)
            .map(|os| OsInstance::new(os, lib))
            .map_err(|err| {
                error!("unable to create os: {}", err);
                err
            })
    })
}
