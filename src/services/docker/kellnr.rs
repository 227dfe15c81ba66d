//! Kellnr private cargo registry

use crate::config::ConfigStore;
use crate::domain::docker::ContainerSpec;
use crate::domain::resource::ResourceOptions;
use crate::error::{ConfigError, DeclareError};
use crate::services::args::{env, sftp_volume, DockerServiceArgs};
use crate::services::docker::registry_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Kellnr {
    pub args: DockerServiceArgs,
    /// Public hostname the registry advertises in its index
    pub origin_hostname: String,
}

impl Kellnr {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            origin_hostname: store.get_or("kellnr.origin_hostname", "localhost"),
        })
    }
}

impl Service for Kellnr {
    fn name(&self) -> &str {
        "kellnr"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = registry_image(&mut scope, "kellnr", "ghcr.io/kellnr/kellnr:5.1.2", platform)?;
        let data = sftp_volume(&mut scope, storage, "kellnr-data", "kellnr/data")?;

        let container = scope.declare(
            "kellnr",
            ContainerSpec::new(image.sha256_digest())
                .hostname(self.args.hostname_or("kellnr"))
                .env(env("KELLNR_ORIGIN__HOSTNAME", &self.origin_hostname))
                .envs([
                    "KELLNR_ORIGIN__PORT=443",
                    "KELLNR_ORIGIN__PROTOCOL=https",
                    "KELLNR_DOCS__ENABLED=true",
                ])
                .network(network.output_id())
                .volume(data.name(), "/opt/kdata"),
            ResourceOptions::new().depends_on([network, &image, &data]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
