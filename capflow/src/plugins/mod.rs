/*!
Plugin system: capability objects, plugin descriptors and the [`Inventory`].

Backends are wrapped into capability objects ([`ConnectorInstance`], [`OsInstance`], processes,
keyboards and CPU states) made of a type erased [`Container`] and one function table per
interface the backend implements. Plugins export [`PluginDescriptor`]s, the inventory finds them,
keeps their libraries loaded and instantiates them by name.

Loading shared libraries is gated behind the `plugins` feature. Statically linked descriptors can
be registered through [`Inventory::add_connector_descriptor`] and
[`Inventory::add_os_descriptor`] in every configuration.
*/

use std::mem::MaybeUninit;
use std::path::{Path, PathBuf};

use abi_stable::abi_stability::abi_checking::check_layout_compatibility;
use abi_stable::{type_layout::TypeLayout, StableAbi};
use log::error;
#[cfg(feature = "plugins")]
use log::{debug, info, warn};
use once_cell::sync::OnceCell;

use crate::abi::{CArc, COption, CSliceRef, OpaqueCallback, ReprCString};
use crate::error::{
    result_from_int, result_from_int_void, AsIntResult, Error, ErrorKind, ErrorOrigin, Result,
};

pub mod args;
#[doc(hidden)]
pub use args::{Args, ConnectorArgs, OsArgs};

pub mod builder;
#[doc(hidden)]
pub use builder::{BuildStep, BuilderEmpty, ConnectorBuilder, ConnectorChain, OsBuilder, OsChain};

pub mod connector;
#[doc(hidden)]
pub use connector::{
    create_connector, ConnectorDescriptor, ConnectorGroup, ConnectorInstance, LoadableConnector,
};

pub mod container;
#[doc(hidden)]
pub use container::{Capabilities, CloneFunctionTable, Container, LibArc};

pub mod cpu_state;
#[doc(hidden)]
pub use cpu_state::{
    ConnectorCpuStateFunctionTable, CpuStateFunctionTable, CpuStateInstance, IntoCpuStateInstance,
};

pub mod inventory;
#[doc(hidden)]
pub use inventory::Inventory;

pub mod logger;
#[doc(hidden)]
pub use logger::PluginLogger;

pub mod mem;
#[doc(hidden)]
pub use mem::{
    CapRef, MemoryViewFunctionTable, MemoryViewInstance, PhysicalMemoryFunctionTable,
    VirtualTranslateFunctionTable,
};

pub mod os;
#[doc(hidden)]
pub use os::{
    create_os, IntoKeyboardInstance, IntoProcessInstance, KeyboardInstance, KeyboardStateInstance,
    LoadableOs, OsDescriptor, OsGroup, OsInstance, OsKeyboardFunctionTable, ProcessGroup,
    ProcessInstance,
};

#[cfg(feature = "plugins")]
pub(crate) mod util;

/// Version of the plugin interface.
///
/// Descriptors built against a different version are refused by the inventory.
pub const CAPFLOW_PLUGIN_VERSION: i32 = 1;

pub type HelpCallback<'a> = OpaqueCallback<'a, ReprCString>;

/// Target a plugin can attach to
#[repr(C)]
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct TargetInfo {
    pub name: ReprCString,
}

pub type TargetCallback<'a> = OpaqueCallback<'a, TargetInfo>;

/// Create function of a plugin.
///
/// Receives the argument string, the optional input object, the library reference the new
/// instance has to hold on to and the logger of the host. On success the instance is written to
/// the last argument and `0` is returned. The input is left in place unless the plugin took it.
pub type CreateFn<T> = extern "C" fn(
    args: CSliceRef<u8>,
    input: &mut COption<<T as Loadable>::Input>,
    lib: LibArc,
    logger: Option<&'static PluginLogger>,
    out: &mut MaybeUninit<<T as Loadable>::Instance>,
) -> i32;

/// Descriptor exported by every plugin.
///
/// Libraries export it as a `#[no_mangle]` static named by the plugin kind prefix followed by the
/// upper case plugin name, e.g. `CAPFLOW_CONNECTOR_DUMMY`. The derive macros in
/// [`capflow_derive`] generate it.
#[repr(C)]
pub struct PluginDescriptor<T: Loadable> {
    /// Has to be [`CAPFLOW_PLUGIN_VERSION`] of the capflow version the plugin was built with.
    pub plugin_version: i32,
    /// Layout of the input object, as seen by the plugin.
    pub input_layout: &'static TypeLayout,
    /// Layout of the created instance, as seen by the plugin.
    pub output_layout: &'static TypeLayout,
    /// Whether the plugin can make use of an input object.
    pub accept_input: bool,
    pub name: CSliceRef<'static, u8>,
    pub version: CSliceRef<'static, u8>,
    pub description: CSliceRef<'static, u8>,
    pub help_callback: Option<extern "C" fn(callback: HelpCallback)>,
    pub target_list_callback: Option<extern "C" fn(callback: TargetCallback) -> i32>,
    pub create: CreateFn<T>,
}

impl<T: Loadable> Clone for PluginDescriptor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Loadable> Copy for PluginDescriptor<T> {}

/// A kind of plugin the inventory can load.
pub trait Loadable: Sized + 'static {
    /// Capability object the plugin creates.
    type Instance: StableAbi;
    /// Object a plugin of this kind may be layered on.
    type Input: StableAbi;

    /// Layout of the input argument of the create function.
    const INPUT_LAYOUT: &'static TypeLayout = <COption<Self::Input> as StableAbi>::LAYOUT;
    /// Layout of the instance written by the create function.
    const OUTPUT_LAYOUT: &'static TypeLayout = <Self::Instance as StableAbi>::LAYOUT;

    /// Export name prefix of descriptors of this kind.
    fn export_prefix() -> &'static str;

    fn plugin_type() -> &'static str;

    fn origin() -> ErrorOrigin;

    /// Resolves the descriptor `export` in an already loaded library.
    #[cfg(feature = "plugins")]
    fn load(path: &Path, library: &CArc<LibContext>, export: &str) -> Result<LibInstance<Self>> {
        let lib = library
            .as_ref()
            .and_then(LibContext::library)
            .ok_or(Error(ErrorOrigin::Inventory, ErrorKind::Uninitialized))?;

        let descriptor = unsafe {
            lib.get::<*mut PluginDescriptor<Self>>(format!("{}\0", export).as_bytes())
                .map_err(|_| Error(ErrorOrigin::Inventory, ErrorKind::ExportsNotFound))?
                .read()
        };

        if descriptor.plugin_version != CAPFLOW_PLUGIN_VERSION {
            warn!(
                "{} has a different version. version {} required, found {}.",
                export, CAPFLOW_PLUGIN_VERSION, descriptor.plugin_version
            );
            return Err(Error(ErrorOrigin::Inventory, ErrorKind::VersionMismatch));
        }

        LibInstance::new(path.to_path_buf(), library.clone(), descriptor)
    }

    /// Loads every plugin of this kind a library exports.
    ///
    /// Exports that fail to resolve are skipped. Fails if the file is not a loadable library or
    /// has no exports of this kind.
    ///
    /// # Safety
    ///
    /// Loading third party libraries runs their initializers, and nothing guarantees that an
    /// exported descriptor actually matches [`PluginDescriptor`]. Use the derive macros to build
    /// plugins.
    #[cfg(feature = "plugins")]
    fn load_all(path: &Path) -> Result<Vec<LibInstance<Self>>> {
        let exports = util::find_export_by_prefix(path, Self::export_prefix())?;
        if exports.is_empty() {
            return Err(Error(ErrorOrigin::Inventory, ErrorKind::ExportsNotFound));
        }

        let library = unsafe { libloading::Library::new(path) }
            .map_err(|err| {
                debug!(
                    "found {:?} in library '{:?}' but could not load it: {}",
                    exports, path, err
                );
                Error(ErrorOrigin::Inventory, ErrorKind::UnableToLoadLibrary)
            })
            .map(LibContext::from)
            .map(CArc::from)?;

        Ok(exports
            .into_iter()
            .filter_map(|e| Self::load(path, &library, &e).ok())
            .collect())
    }

    /// Loads the plugins of a library into `out`, skipping names that are registered already.
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] if the library only contained known plugins.
    #[cfg(feature = "plugins")]
    fn load_append(path: &Path, out: &mut Vec<LibInstance<Self>>) -> Result<()> {
        let libs = Self::load_all(path)?;
        let mut added = false;

        for lib in libs.into_iter() {
            if lib.exists_in(out) {
                debug!(
                    "skipping plugin '{}' because it was added already: {:?}",
                    lib.name(),
                    path
                );
            } else {
                info!(
                    "adding plugin '{}/{}': {:?}",
                    Self::plugin_type(),
                    lib.name(),
                    path
                );
                out.push(lib);
                added = true;
            }
        }

        if added {
            Ok(())
        } else {
            Err(Error(ErrorOrigin::Inventory, ErrorKind::AlreadyExists))
        }
    }
}

/// Context of a single plugin library.
///
/// Every instance created from the library holds a reference to it, the library is unloaded once
/// the inventory and all of those instances are gone.
pub struct LibContext {
    #[cfg(feature = "plugins")]
    lib: Option<libloading::Library>,
    logger: OnceCell<Box<PluginLogger>>,
}

#[cfg(feature = "plugins")]
impl From<libloading::Library> for LibContext {
    fn from(lib: libloading::Library) -> Self {
        Self {
            lib: Some(lib),
            logger: Default::default(),
        }
    }
}

impl LibContext {
    /// Context of plugins that are linked into the host.
    pub fn builtin() -> Self {
        Self {
            #[cfg(feature = "plugins")]
            lib: None,
            logger: Default::default(),
        }
    }

    #[cfg(feature = "plugins")]
    fn library(&self) -> Option<&libloading::Library> {
        self.lib.as_ref()
    }

    /// Returns `true` for plugins linked into the host. They share the logger of the host.
    pub fn is_builtin(&self) -> bool {
        #[cfg(feature = "plugins")]
        {
            self.lib.is_none()
        }
        #[cfg(not(feature = "plugins"))]
        {
            true
        }
    }

    /// Get a static logger for this library context.
    ///
    /// # Safety
    ///
    /// The returned logger is not actually static. Caller must ensure the reference won't dangle
    /// after the library is unloaded. This is typically ensured by only passing this reference to
    /// the underlying library code.
    pub unsafe fn get_logger(&self) -> &'static PluginLogger {
        &*(&**self.logger.get_or_init(|| Box::new(PluginLogger::new())) as *const PluginLogger)
    }

    pub fn try_get_logger(&self) -> Option<&PluginLogger> {
        self.logger.get().map(|l| &**l)
    }
}

/// Reference counted library instance
///
/// Pairs a descriptor with the library it was found in. Cloning the library reference into every
/// created instance is what keeps the library from being unloaded too early.
pub struct LibInstance<T: Loadable> {
    path: PathBuf,
    library: CArc<LibContext>,
    descriptor: PluginDescriptor<T>,
}

impl<T: Loadable> Clone for LibInstance<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            library: self.library.clone(),
            descriptor: self.descriptor,
        }
    }
}

impl<T: Loadable> LibInstance<T> {
    /// Validates the strings of `descriptor` and wraps it.
    pub fn new(
        path: PathBuf,
        library: CArc<LibContext>,
        descriptor: PluginDescriptor<T>,
    ) -> Result<Self> {
        let valid = [descriptor.name, descriptor.version, descriptor.description]
            .iter()
            .all(|s| s.to_str().is_some());

        if !valid || descriptor.name.is_empty() {
            return Err(Error(ErrorOrigin::Inventory, ErrorKind::Encoding)
                .log_error(format!("invalid plugin descriptor in {:?}", path)));
        }

        check_layouts(&descriptor).map_err(|err| {
            log::warn!(
                "{} `{}` in {:?} was built against an incompatible ABI: {}",
                T::plugin_type(),
                unsafe { descriptor.name.into_str() },
                path,
                err
            );
            Error(ErrorOrigin::Inventory, ErrorKind::InvalidAbi)
        })?;

        Ok(Self {
            path,
            library,
            descriptor,
        })
    }

    /// Wraps a descriptor of a plugin linked into the host.
    pub fn builtin(descriptor: PluginDescriptor<T>) -> Result<Self> {
        Self::new(PathBuf::new(), CArc::from(LibContext::builtin()), descriptor)
    }

    pub fn name(&self) -> &str {
        // checked in `new`
        unsafe { self.descriptor.name.into_str() }
    }

    pub fn version(&self) -> &str {
        unsafe { self.descriptor.version.into_str() }
    }

    pub fn description(&self) -> &str {
        unsafe { self.descriptor.description.into_str() }
    }

    /// Path of the library, empty for builtin plugins.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn accepts_input(&self) -> bool {
        self.descriptor.accept_input
    }

    pub fn library(&self) -> &CArc<LibContext> {
        &self.library
    }

    /// Checks if a plugin with the same name is in `instances`.
    pub fn exists_in(&self, instances: &[LibInstance<T>]) -> bool {
        instances.iter().any(|i| i.name() == self.name())
    }

    /// Retrieves the help text of the plugin.
    pub fn help(&self) -> Result<String> {
        match self.descriptor.help_callback {
            Some(help_callback) => {
                let mut ret = vec![];
                (help_callback)((&mut ret).into());
                ret.first().map(|h| h.to_string()).ok_or_else(|| {
                    Error(T::origin(), ErrorKind::NotSupported).log_error(format!(
                        "{} `{}` did not return any help text.",
                        T::plugin_type(),
                        self.name()
                    ))
                })
            }
            None => Err(Error(T::origin(), ErrorKind::NotSupported).log_error(format!(
                "{} `{}` does not support help text.",
                T::plugin_type(),
                self.name()
            ))),
        }
    }

    /// Retrieves the targets the plugin can attach to.
    pub fn target_list(&self) -> Result<Vec<TargetInfo>> {
        match self.descriptor.target_list_callback {
            Some(target_list_callback) => {
                let mut ret = vec![];
                result_from_int_void((target_list_callback)((&mut ret).into()))?;
                Ok(ret)
            }
            None => Err(Error(T::origin(), ErrorKind::NotSupported).log_error(format!(
                "{} `{}` does not support target listing.",
                T::plugin_type(),
                self.name()
            ))),
        }
    }

    /// Creates an instance of the plugin.
    ///
    /// `input` is only taken if the plugin succeeds and actually uses it.
    pub fn instantiate(&self, args: &str, input: &mut Option<T::Input>) -> Result<T::Instance> {
        if input.is_some() && !self.descriptor.accept_input {
            return Err(Error(T::origin(), ErrorKind::InvalidInput).log_error(format!(
                "{} `{}` does not accept an input object",
                T::plugin_type(),
                self.name()
            )));
        }

        let (lib, logger) = if self.library.is_builtin() {
            (LibArc::none(), None)
        } else {
            let logger = unsafe { self.library.get_logger() };
            (self.library.clone().into_opaque().into(), Some(logger))
        };

        let mut cinput = COption::from(input.take());
        let mut out = MaybeUninit::uninit();
        let res = (self.descriptor.create)(args.into(), &mut cinput, lib, logger, &mut out);
        *input = cinput.into();

        result_from_int(res, out)
    }
}

/// Compares the layouts a descriptor was built with against the ones of the host.
fn check_layouts<T: Loadable>(
    descriptor: &PluginDescriptor<T>,
) -> std::result::Result<(), abi_stable::abi_stability::abi_checking::AbiInstabilityErrors> {
    check_layout_compatibility(T::INPUT_LAYOUT, descriptor.input_layout)?;
    check_layout_compatibility(T::OUTPUT_LAYOUT, descriptor.output_layout)
}

/// Plugin side of every create function.
///
/// Sets up the host logger, parses the arguments and runs `create_fn` with the input object. The
/// input is put back afterwards, whatever `create_fn` left in it is returned to the host.
pub(crate) fn create_instance<I, O>(
    args: CSliceRef<u8>,
    input: &mut COption<I>,
    logger: Option<&'static PluginLogger>,
    out: &mut MaybeUninit<O>,
    create_fn: impl FnOnce(&Args, &mut Option<I>) -> Result<O>,
) -> i32 {
    if let Some(logger) = logger {
        logger.init().ok();
    }

    let args = match args.to_str() {
        Some(args) => args,
        None => {
            error!("plugin arguments are not valid utf-8");
            return Error(ErrorOrigin::Args, ErrorKind::Encoding).into_i32();
        }
    };

    let args = match str::parse::<Args>(args) {
        Ok(args) => args,
        Err(err) => {
            error!("unable to parse plugin arguments: {}", err);
            return err.into_i32();
        }
    };

    let mut opt = input.take();
    let res = create_fn(&args, &mut opt);
    *input = opt.into();

    res.into_int_out_result(out)
}

/// Error of `into_*` conversions on a container that only borrows its instance.
pub(crate) fn borrowed_container_error() -> Error {
    Error(ErrorOrigin::Ffi, ErrorKind::InvalidInput)
}
