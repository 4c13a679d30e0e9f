//! Registry of available plugins.

#[cfg(feature = "plugins")]
use std::fs::read_dir;
#[cfg(feature = "plugins")]
use std::path::{Path, PathBuf};

use log::{error, info, LevelFilter};

use super::builder::BuilderEmpty;
use super::connector::{ConnectorDescriptor, ConnectorInstance, LoadableConnector};
use super::os::{LoadableOs, OsDescriptor, OsInstance};
use super::{LibContext, LibInstance, Loadable, TargetInfo};
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};

/// The core of the plugin system
///
/// It scans system directories and collects valid capflow plugins. They can then be instantiated
/// by name, any number of times. Every library stays loaded for as long as the inventory or an
/// instance created from it is alive.
///
/// # Examples
///
/// Creating an OS on top of a connector:
///
/// ```no_run
/// use capflow::plugins::Inventory;
/// # use capflow::error::Result;
/// # fn test() -> Result<()> {
/// let inventory = Inventory::scan();
/// let os = inventory
///   .builder()
///   .connector("kvm")
///   .os("win32")
///   .build()?;
/// # Ok(())
/// # }
/// # test().ok();
/// ```
///
/// Registering a builtin plugin:
///
/// ```
/// use capflow::abi::{opt_call, CTup2, CTup3};
/// use capflow::derive::connector;
/// use capflow::error::Result;
/// use capflow::mem::{
///     PhysicalMemory, PhysicalMemoryMetadata, PhysicalReadMemOps, PhysicalWriteMemOps,
/// };
/// use capflow::plugins::{ConnectorArgs, ConnectorGroup, Inventory};
/// use capflow::types::Address;
///
/// #[derive(Clone)]
/// pub struct NullMemory;
///
/// impl PhysicalMemory for NullMemory {
///     fn phys_read_raw_iter(&mut self, data: PhysicalReadMemOps) -> Result<()> {
///         let (inp, mut out, _) = data.into_parts();
///         for CTup3(_, meta, mut buf) in inp {
///             buf.iter_mut().for_each(|b| *b = 0);
///             opt_call(out.as_deref_mut(), CTup2(meta, buf));
///         }
///         Ok(())
///     }
///
///     fn phys_write_raw_iter(&mut self, data: PhysicalWriteMemOps) -> Result<()> {
///         let (inp, mut out, _) = data.into_parts();
///         for CTup3(_, meta, buf) in inp {
///             opt_call(out.as_deref_mut(), CTup2(meta, buf));
///         }
///         Ok(())
///     }
///
///     fn metadata(&self) -> PhysicalMemoryMetadata {
///         PhysicalMemoryMetadata {
///             max_address: Address::from(u64::MAX),
///             real_size: u64::MAX,
///             readonly: false,
///             ideal_batch_size: u32::MAX,
///         }
///     }
/// }
///
/// impl ConnectorGroup for NullMemory {}
///
/// #[connector(name = "null")]
/// pub fn create_connector(_args: &ConnectorArgs) -> Result<NullMemory> {
///     Ok(NullMemory)
/// }
///
/// let mut inventory = Inventory::new();
/// inventory.add_connector_descriptor(CAPFLOW_CONNECTOR_NULL).unwrap();
/// assert_eq!(inventory.available_connectors(), ["null"]);
///
/// let mut conn = inventory.create_connector("null", "").unwrap();
/// assert_eq!(conn.phys_read::<u64>(0x1000.into()).unwrap(), 0);
/// ```
#[derive(Default)]
pub struct Inventory {
    connectors: Vec<LibInstance<LoadableConnector>>,
    os_layers: Vec<LibInstance<LoadableOs>>,
}

impl Inventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new inventory of plugins from the provided path.
    ///
    /// The path has to be a valid directory or the function will fail with
    /// [`ErrorKind::InvalidPath`].
    #[cfg(feature = "plugins")]
    pub fn scan_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut ret = Self::new();
        ret.add_dir(path.as_ref().to_path_buf())?;
        Ok(ret)
    }

    /// Creates a new inventory of plugins by searching various paths.
    ///
    /// It will query PATH, and an additional set of of directories (standard unix ones, if unix,
    /// and "HOME/.local/lib" on all OSes) for a "capflow" directory, and if there is one, then
    /// search for libraries in there. The current working directory is searched as well.
    #[cfg(feature = "plugins")]
    pub fn scan() -> Self {
        #[cfg(unix)]
        let extra_paths: Vec<&str> = vec![
            "/opt",
            "/lib",
            "/usr/lib/",
            "/usr/local/lib",
            "/lib32",
            "/lib64",
            "/usr/lib32",
            "/usr/lib64",
            "/usr/local/lib32",
            "/usr/local/lib64",
        ];
        #[cfg(not(unix))]
        let extra_paths: Vec<&str> = vec![];

        let path_iter = extra_paths.into_iter().map(PathBuf::from);

        let path_var = std::env::var_os("PATH");
        let path_iter = path_iter.chain(
            path_var
                .as_ref()
                .map(std::env::split_paths)
                .into_iter()
                .flatten(),
        );

        #[cfg(unix)]
        let path_iter = path_iter.chain(
            dirs::home_dir()
                .map(|dir| dir.join(".local").join("lib"))
                .into_iter(),
        );

        #[cfg(not(unix))]
        let path_iter = path_iter.chain(dirs::document_dir().into_iter());

        let mut ret = Self::new();

        for mut path in path_iter {
            path.push("capflow");
            ret.add_dir(path).ok();
        }

        if let Ok(pwd) = std::env::current_dir() {
            ret.add_dir(pwd).ok();
        }

        ret
    }

    /// Adds a library directory to the inventory
    ///
    /// Only files whose name contains `filter` are looked at. Files that are not valid plugin
    /// libraries are skipped.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initializers, and nothing can check that the exported
    /// descriptors match what capflow expects.
    #[cfg(feature = "plugins")]
    pub fn add_dir_filtered(&mut self, dir: PathBuf, filter: &str) -> Result<&mut Self> {
        if !dir.is_dir() {
            return Err(Error(ErrorOrigin::Inventory, ErrorKind::InvalidPath));
        }

        info!("scanning {:?} for libraries", dir);

        for entry in
            read_dir(dir).map_err(|_| Error(ErrorOrigin::Inventory, ErrorKind::UnableToReadDir))?
        {
            let entry = entry
                .map_err(|_| Error(ErrorOrigin::Inventory, ErrorKind::UnableToReadDirEntry))?;
            if let Some(true) = entry.file_name().to_str().map(|n| n.contains(filter)) {
                self.load(entry.path());
            }
        }

        Ok(self)
    }

    /// Adds a library directory to the inventory
    ///
    /// # Safety
    ///
    /// Same as [`Inventory::add_dir_filtered`].
    #[cfg(feature = "plugins")]
    pub fn add_dir(&mut self, dir: PathBuf) -> Result<&mut Self> {
        self.add_dir_filtered(dir, "")
    }

    /// Adds a single library to the inventory
    ///
    /// Libraries without capflow plugins, or with plugins that are registered already, are
    /// silently skipped.
    ///
    /// # Safety
    ///
    /// Same as [`Inventory::add_dir_filtered`].
    #[cfg(feature = "plugins")]
    pub fn load(&mut self, path: PathBuf) -> &mut Self {
        LoadableConnector::load_append(&path, &mut self.connectors).ok();
        LoadableOs::load_append(&path, &mut self.os_layers).ok();
        self
    }

    /// Registers a connector that is linked into the host.
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] if a connector of the same name is known.
    pub fn add_connector_descriptor(
        &mut self,
        descriptor: ConnectorDescriptor,
    ) -> Result<&mut Self> {
        Self::add_builtin(&mut self.connectors, descriptor)?;
        Ok(self)
    }

    /// Registers an OS plugin that is linked into the host.
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] if an OS plugin of the same name is known.
    pub fn add_os_descriptor(&mut self, descriptor: OsDescriptor) -> Result<&mut Self> {
        Self::add_builtin(&mut self.os_layers, descriptor)?;
        Ok(self)
    }

    fn add_builtin<T: Loadable>(
        libs: &mut Vec<LibInstance<T>>,
        descriptor: super::PluginDescriptor<T>,
    ) -> Result<()> {
        if descriptor.plugin_version != super::CAPFLOW_PLUGIN_VERSION {
            return Err(Error(ErrorOrigin::Inventory, ErrorKind::VersionMismatch));
        }

        let lib = LibInstance::builtin(descriptor)?;
        if lib.exists_in(libs) {
            return Err(Error(ErrorOrigin::Inventory, ErrorKind::AlreadyExists));
        }

        info!("adding builtin plugin '{}/{}'", T::plugin_type(), lib.name());
        libs.push(lib);
        Ok(())
    }

    /// Returns the names of all currently available connectors that can be used.
    pub fn available_connectors(&self) -> Vec<String> {
        self.connectors
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
    }

    /// Returns the names of all currently available os plugins that can be used.
    pub fn available_os(&self) -> Vec<String> {
        self.os_layers
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
    }

    /// Returns the help string of the given Connector.
    ///
    /// This function returns an error in case the Connector was not found or does not implement
    /// the help feature.
    pub fn connector_help(&self, name: &str) -> Result<String> {
        Self::find(&self.connectors, name)?.help()
    }

    /// Returns the help string of the given Os Plugin.
    ///
    /// This function returns an error in case the Os Plugin was not found or does not implement
    /// the help feature.
    pub fn os_help(&self, name: &str) -> Result<String> {
        Self::find(&self.os_layers, name)?.help()
    }

    /// Returns a list of all available targets of the connector.
    ///
    /// This function returns an error in case the connector does not implement this feature.
    pub fn connector_target_list(&self, name: &str) -> Result<Vec<TargetInfo>> {
        Self::find(&self.connectors, name)?.target_list()
    }

    /// Creates a new Connector / OS builder.
    pub fn builder(&self) -> BuilderEmpty {
        BuilderEmpty::new(self)
    }

    /// Creates a connector.
    ///
    /// # Arguments
    ///
    /// * `name` - name of the connector plugin
    /// * `args` - argument string passed to the plugin
    pub fn create_connector(&self, name: &str, args: &str) -> Result<ConnectorInstance> {
        Self::create_internal(&self.connectors, name, args, &mut None)
    }

    /// Creates a connector on top of an OS.
    ///
    /// The OS is only taken out of `os` if the connector was created and made use of it.
    pub fn create_connector_with_os(
        &self,
        name: &str,
        args: &str,
        os: &mut Option<OsInstance>,
    ) -> Result<ConnectorInstance> {
        Self::create_internal(&self.connectors, name, args, os)
    }

    /// Creates an OS.
    ///
    /// # Arguments
    ///
    /// * `name` - name of the OS plugin
    /// * `args` - argument string passed to the plugin
    /// * `connector` - connector to be passed to the OS
    ///
    /// The connector is only taken out of `connector` if the OS was created and made use of it.
    /// On failure the caller still owns it.
    pub fn create_os(
        &self,
        name: &str,
        args: &str,
        connector: &mut Option<ConnectorInstance>,
    ) -> Result<OsInstance> {
        Self::create_internal(&self.os_layers, name, args, connector)
    }

    fn find<'a, T: Loadable>(libs: &'a [LibInstance<T>], name: &str) -> Result<&'a LibInstance<T>> {
        libs.iter().find(|c| c.name() == name).ok_or_else(|| {
            error!(
                "unable to find plugin with name '{}'. available `{}` plugins are: {}",
                name,
                T::plugin_type(),
                libs.iter()
                    .map(|c| c.name().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            Error(ErrorOrigin::Inventory, ErrorKind::PluginNotFound)
        })
    }

    fn create_internal<T: Loadable>(
        libs: &[LibInstance<T>],
        name: &str,
        args: &str,
        input: &mut Option<T::Input>,
    ) -> Result<T::Instance> {
        let lib = Self::find(libs, name)?;

        info!(
            "attempting to load `{}` type plugin `{}` from `{}`",
            T::plugin_type(),
            lib.name(),
            if lib.path().as_os_str().is_empty() {
                "builtin".into()
            } else {
                lib.path().to_string_lossy()
            },
        );

        lib.instantiate(args, input)
    }

    /// Sets the maximum logging level in all plugins and updates the
    /// internal [`PluginLogger`](super::PluginLogger) in each plugin instance.
    pub fn set_max_log_level(&self, level: LevelFilter) {
        log::set_max_level(level);
        self.update_max_log_level()
    }

    fn update_max_log_level(&self) {
        let level = log::max_level();

        self.connectors
            .iter()
            .map(|c| c.library())
            .chain(self.os_layers.iter().map(|o| o.library()))
            .filter_map(|l| l.as_ref())
            .filter_map(LibContext::try_get_logger)
            .for_each(|l| l.on_level_change(level));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi_stable::StableAbi;
    use crate::dummy::{CAPFLOW_CONNECTOR_DUMMY, CAPFLOW_OS_DUMMY};
    use crate::mem::PhysicalMemory;

    fn inventory() -> Inventory {
        let mut inventory = Inventory::new();
        inventory
            .add_connector_descriptor(CAPFLOW_CONNECTOR_DUMMY)
            .unwrap()
            .add_os_descriptor(CAPFLOW_OS_DUMMY)
            .unwrap();
        inventory
    }

    #[test]
    fn builtin_listing() {
        let inventory = inventory();
        assert_eq!(inventory.available_connectors(), ["dummy"]);
        assert_eq!(inventory.available_os(), ["dummy"]);
    }

    #[test]
    fn duplicate_builtin() {
        let mut inventory = inventory();
        assert_eq!(
            inventory.add_connector_descriptor(CAPFLOW_CONNECTOR_DUMMY).err(),
            Some(Error(ErrorOrigin::Inventory, ErrorKind::AlreadyExists))
        );
        assert_eq!(inventory.available_connectors().len(), 1);
    }

    #[test]
    fn version_mismatch() {
        let mut descriptor = CAPFLOW_CONNECTOR_DUMMY;
        descriptor.plugin_version += 1;
        assert_eq!(
            Inventory::new().add_connector_descriptor(descriptor).err(),
            Some(Error(ErrorOrigin::Inventory, ErrorKind::VersionMismatch))
        );
    }

    #[test]
    fn layout_mismatch() {
        let mut descriptor = CAPFLOW_CONNECTOR_DUMMY;
        descriptor.output_layout = <OsInstance as StableAbi>::LAYOUT;
        assert_eq!(
            Inventory::new().add_connector_descriptor(descriptor).err(),
            Some(Error(ErrorOrigin::Inventory, ErrorKind::InvalidAbi))
        );

        let mut descriptor = CAPFLOW_OS_DUMMY;
        descriptor.input_layout = <crate::abi::COption<OsInstance> as StableAbi>::LAYOUT;
        assert_eq!(
            Inventory::new().add_os_descriptor(descriptor).err(),
            Some(Error(ErrorOrigin::Inventory, ErrorKind::InvalidAbi))
        );
    }

    #[test]
    fn unknown_plugin() {
        let inventory = inventory();
        assert_eq!(
            inventory.create_connector("does-not-exist", "").err(),
            Some(Error(ErrorOrigin::Inventory, ErrorKind::PluginNotFound))
        );
        assert!(inventory.create_connector("dummy", "").is_ok());
    }

    #[test]
    fn builtin_carries_no_library() {
        let inventory = inventory();
        let mut conn = inventory.create_connector("dummy", "size=64k").unwrap();
        assert!(!conn.library().is_some());
        assert_eq!(conn.metadata().real_size, 64 * 1024);
        conn.phys_write(0x10.into(), &5u32).unwrap();
    }

    #[test]
    fn help_and_targets() {
        let inventory = inventory();
        assert!(inventory.connector_help("dummy").unwrap().contains("size"));
        assert!(inventory.os_help("nope").is_err());
        assert!(inventory.connector_target_list("dummy").unwrap().is_empty());
    }

    #[cfg(feature = "plugins")]
    #[test]
    fn add_dir_nonexistent() {
        let mut inventory = Inventory::new();
        assert_eq!(
            inventory
                .add_dir("/this/path/does/not/exist/capflow".into())
                .err(),
            Some(Error(ErrorOrigin::Inventory, ErrorKind::InvalidPath))
        );
    }
}
