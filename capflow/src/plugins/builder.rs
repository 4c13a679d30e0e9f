use std::convert::{TryFrom, TryInto};

use super::{ConnectorArgs, ConnectorInstance, Inventory, OsArgs, OsInstance};
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};

/// A single step of a build chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep<'a> {
    Connector {
        name: &'a str,
        args: Option<ConnectorArgs>,
    },
    Os {
        name: &'a str,
        args: Option<OsArgs>,
    },
}

impl<'a> BuildStep<'a> {
    /// Parses `name:args` into a connector step.
    ///
    /// For example `dummy`, or `dummy:size=16m`.
    pub fn new_connector(input: &'a str) -> Result<Self> {
        let (name, args) = split_step(input)?;
        Ok(Self::Connector { name, args })
    }

    /// Parses `name:args` into an OS step.
    ///
    /// For example `dummy`, or `dummy:procs=4`.
    pub fn new_os(input: &'a str) -> Result<Self> {
        let (name, args) = split_step(input)?;
        Ok(Self::Os { name, args })
    }

    /// Returns the plugin name of this step.
    pub fn name(&self) -> &'a str {
        match self {
            BuildStep::Connector { name, .. } | BuildStep::Os { name, .. } => name,
        }
    }

    /// Whether `next` may follow this step. Connectors and OS layers have to alternate.
    pub fn validate_next(&self, next: &Self) -> bool {
        !matches!(
            (self, next),
            (BuildStep::Connector { .. }, BuildStep::Connector { .. })
                | (BuildStep::Os { .. }, BuildStep::Os { .. })
        )
    }

    fn args_string(&self) -> String {
        match self {
            BuildStep::Connector { args, .. } | BuildStep::Os { args, .. } => args
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }
}

fn split_step(input: &str) -> Result<(&str, Option<ConnectorArgs>)> {
    let (name, args) = input.split_once(':').unwrap_or((input, ""));

    if name.is_empty() {
        return Err(Error(ErrorOrigin::Other, ErrorKind::ArgValidation)
            .log_error("build step is missing a plugin name"));
    }

    let args = if args.is_empty() {
        None
    } else {
        Some(args.parse()?)
    };

    Ok((name, args))
}

fn builder_from_args<'a>(
    connectors: impl Iterator<Item = (usize, &'a str)>,
    os_layers: impl Iterator<Item = (usize, &'a str)>,
) -> Result<Vec<BuildStep<'a>>> {
    let mut layers = connectors
        .map(|(i, a)| BuildStep::new_connector(a).map(|a| (i, a)))
        .chain(os_layers.map(|(i, a)| BuildStep::new_os(a).map(|a| (i, a))))
        .collect::<Result<Vec<_>>>()?;

    layers.sort_by_key(|(i, _)| *i);

    if layers.windows(2).any(|w| !w[0].1.validate_next(&w[1].1)) {
        return Err(
            Error(ErrorOrigin::Other, ErrorKind::ArgValidation).log_error(
                "invalid builder configuration, build steps cannot be used in the given order",
            ),
        );
    }

    Ok(layers.into_iter().map(|(_, s)| s).collect())
}

/// Pre-validated chain ending in a connector.
///
/// Use this with [`Inventory::builder`].
#[derive(Debug, Clone)]
pub struct ConnectorChain<'a>(Vec<BuildStep<'a>>);

impl<'a> ConnectorChain<'a> {
    /// Builds a new connector chain.
    ///
    /// Both iterators yield command line values together with their position. The position
    /// orders the steps and has to make connectors and OS layers alternate.
    pub fn new(
        connectors: impl Iterator<Item = (usize, &'a str)>,
        os_layers: impl Iterator<Item = (usize, &'a str)>,
    ) -> Result<Self> {
        builder_from_args(connectors, os_layers)?.try_into()
    }
}

impl<'a> TryFrom<Vec<BuildStep<'a>>> for ConnectorChain<'a> {
    type Error = Error;

    fn try_from(steps: Vec<BuildStep<'a>>) -> Result<Self> {
        if !matches!(steps.last(), Some(BuildStep::Connector { .. })) {
            return Err(
                Error(ErrorOrigin::Other, ErrorKind::ArgValidation).log_error(
                    "invalid builder configuration, last build step has to be a connector",
                ),
            );
        }

        Ok(Self(steps))
    }
}

/// Pre-validated chain ending in an OS.
///
/// Use this with [`Inventory::builder`].
#[derive(Debug, Clone)]
pub struct OsChain<'a>(Vec<BuildStep<'a>>);

impl<'a> OsChain<'a> {
    /// Builds a new OS chain.
    ///
    /// See [`ConnectorChain::new`].
    pub fn new(
        connectors: impl Iterator<Item = (usize, &'a str)>,
        os_layers: impl Iterator<Item = (usize, &'a str)>,
    ) -> Result<Self> {
        builder_from_args(connectors, os_layers)?.try_into()
    }
}

impl<'a> TryFrom<Vec<BuildStep<'a>>> for OsChain<'a> {
    type Error = Error;

    fn try_from(steps: Vec<BuildStep<'a>>) -> Result<Self> {
        if !matches!(steps.last(), Some(BuildStep::Os { .. })) {
            return Err(Error(ErrorOrigin::Other, ErrorKind::ArgValidation)
                .log_error("invalid builder configuration, last build step has to be an os"));
        }

        Ok(Self(steps))
    }
}

/// Output of a build chain that is still being assembled.
enum Built {
    None,
    Connector(ConnectorInstance),
    Os(OsInstance),
}

fn run_steps(inventory: &Inventory, steps: &[BuildStep]) -> Result<Built> {
    let mut out = Built::None;

    for step in steps {
        let args = step.args_string();
        out = match step {
            BuildStep::Connector { name, .. } => {
                let mut os = match out {
                    Built::Os(os) => Some(os),
                    _ => None,
                };
                Built::Connector(inventory.create_connector_with_os(name, &args, &mut os)?)
            }
            BuildStep::Os { name, .. } => {
                let mut connector = match out {
                    Built::Connector(connector) => Some(connector),
                    _ => None,
                };
                Built::Os(inventory.create_os(name, &args, &mut connector)?)
            }
        };
    }

    Ok(out)
}

/// Starting point of a build chain, continue with either `connector` or `os`.
pub struct BuilderEmpty<'a> {
    inventory: &'a Inventory,
}

impl<'a> BuilderEmpty<'a> {
    pub fn new(inventory: &'a Inventory) -> Self {
        Self { inventory }
    }

    /// Adds a connector to the build chain.
    pub fn connector(self, name: &'a str) -> OsBuilder<'a> {
        OsBuilder {
            inventory: self.inventory,
            steps: vec![BuildStep::Connector { name, args: None }],
        }
    }

    /// Adds an OS to the build chain.
    pub fn os(self, name: &'a str) -> ConnectorBuilder<'a> {
        ConnectorBuilder {
            inventory: self.inventory,
            steps: vec![BuildStep::Os { name, args: None }],
        }
    }

    /// Starts from pre-validated steps ending in an OS.
    pub fn os_chain(self, chain: OsChain<'a>) -> ConnectorBuilder<'a> {
        ConnectorBuilder {
            inventory: self.inventory,
            steps: chain.0,
        }
    }

    /// Starts from pre-validated steps ending in a connector.
    pub fn connector_chain(self, chain: ConnectorChain<'a>) -> OsBuilder<'a> {
        OsBuilder {
            inventory: self.inventory,
            steps: chain.0,
        }
    }
}

/// Chain whose last step is an OS.
pub struct ConnectorBuilder<'a> {
    inventory: &'a Inventory,
    steps: Vec<BuildStep<'a>>,
}

impl<'a> ConnectorBuilder<'a> {
    /// Adds a connector that receives the previous OS as input.
    pub fn connector(mut self, name: &'a str) -> OsBuilder<'a> {
        self.steps.push(BuildStep::Connector { name, args: None });
        OsBuilder {
            inventory: self.inventory,
            steps: self.steps,
        }
    }

    /// Sets the arguments of the previously added OS.
    pub fn args(mut self, os_args: OsArgs) -> Self {
        if let Some(BuildStep::Os { args, .. }) = self.steps.last_mut() {
            *args = Some(os_args);
        }
        self
    }

    /// Runs every step and returns the final OS.
    ///
    /// Each step receives the output of the previous one. The first failing step aborts the
    /// chain, dropping everything built so far.
    pub fn build(self) -> Result<OsInstance> {
        match run_steps(self.inventory, &self.steps)? {
            Built::Os(os) => Ok(os),
            _ => Err(Error(ErrorOrigin::Inventory, ErrorKind::Configuration)),
        }
    }
}

/// Chain whose last step is a connector.
pub struct OsBuilder<'a> {
    inventory: &'a Inventory,
    steps: Vec<BuildStep<'a>>,
}

impl<'a> OsBuilder<'a> {
    /// Adds an OS that receives the previous connector as input.
    pub fn os(mut self, name: &'a str) -> ConnectorBuilder<'a> {
        self.steps.push(BuildStep::Os { name, args: None });
        ConnectorBuilder {
            inventory: self.inventory,
            steps: self.steps,
        }
    }

    /// Sets the arguments of the previously added connector.
    pub fn args(mut self, conn_args: ConnectorArgs) -> Self {
        if let Some(BuildStep::Connector { args, .. }) = self.steps.last_mut() {
            *args = Some(conn_args);
        }
        self
    }

    /// Runs every step and returns the final connector.
    ///
    /// See [`ConnectorBuilder::build`].
    pub fn build(self) -> Result<ConnectorInstance> {
        match run_steps(self.inventory, &self.steps)? {
            Built::Connector(connector) => Ok(connector),
            _ => Err(Error(ErrorOrigin::Inventory, ErrorKind::Configuration)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{CAPFLOW_CONNECTOR_DUMMY, CAPFLOW_OS_DUMMY};
    use crate::mem::PhysicalMemory;
    use crate::os::Os;

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
    fn parse_steps() {
        assert_eq!(
            BuildStep::new_connector("dummy").unwrap(),
            BuildStep::Connector {
                name: "dummy",
                args: None
            }
        );

        let step = BuildStep::new_os("dummy:procs=3").unwrap();
        assert_eq!(step.name(), "dummy");
        assert_eq!(step.args_string(), "procs=3");

        assert!(BuildStep::new_os(":procs=3").is_err());
    }

    #[test]
    fn chain_order() {
        let chain = OsChain::new(
            vec![(1, "dummy:size=1m")].into_iter(),
            vec![(2, "dummy")].into_iter(),
        )
        .unwrap();
        assert_eq!(chain.0.len(), 2);
        assert_eq!(chain.0[0].name(), "dummy");

        assert_eq!(
            ConnectorChain::new(
                vec![(1, "dummy")].into_iter(),
                vec![(2, "dummy")].into_iter()
            )
            .err(),
            Some(Error(ErrorOrigin::Other, ErrorKind::ArgValidation))
        );

        assert!(OsChain::new(
            vec![(1, "a"), (2, "b")].into_iter(),
            vec![(3, "c")].into_iter()
        )
        .is_err());
    }

    #[test]
    fn build_os_on_connector() {
        let inventory = inventory();
        let mut os = inventory
            .builder()
            .connector("dummy")
            .args("size=1m".parse().unwrap())
            .os("dummy")
            .args("procs=2".parse().unwrap())
            .build()
            .unwrap();

        assert_eq!(os.process_info_list().unwrap().len(), 2);
        let phys = os.as_phys_mem().unwrap();
        assert_eq!(phys.metadata().real_size, 1024 * 1024);
    }

    #[test]
    fn build_from_chain() {
        let inventory = inventory();
        let chain = ConnectorChain::new(vec![(0, "dummy:size=2m")].into_iter(), std::iter::empty())
            .unwrap();
        let conn = inventory.builder().connector_chain(chain).build().unwrap();
        assert_eq!(conn.metadata().real_size, 2 * 1024 * 1024);
    }

    #[test]
    fn failing_step_aborts() {
        let inventory = inventory();
        assert_eq!(
            inventory
                .builder()
                .connector("dummy")
                .os("missing")
                .build()
                .err(),
            Some(Error(ErrorOrigin::Inventory, ErrorKind::PluginNotFound))
        );
    }
}
