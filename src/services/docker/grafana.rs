//! Grafana OSS with plugins installed at startup

use crate::config::ConfigStore;
use crate::domain::docker::ContainerSpec;
use crate::domain::resource::ResourceOptions;
use crate::error::{ConfigError, DeclareError};
use crate::services::args::{env, sftp_volume, DockerServiceArgs};
use crate::services::docker::registry_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Grafana {
    pub args: DockerServiceArgs,
    /// Comma separated plugin ids for `GF_INSTALL_PLUGINS`
    pub plugins: String,
}

impl Grafana {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            plugins: store.get_list("grafana.plugins").join(","),
        })
    }
}

impl Service for Grafana {
    fn name(&self) -> &str {
        "grafana"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = registry_image(&mut scope, "grafana", "grafana/grafana-oss:latest", platform)?;
        let data = sftp_volume(&mut scope, storage, "grafana-data", "grafana/data")?;

        let container = scope.declare(
            "grafana",
            ContainerSpec::new(image.sha256_digest())
                .hostname(self.args.hostname_or("grafana"))
                .env(env("GF_INSTALL_PLUGINS", &self.plugins))
                .network(network.output_id())
                .volume(data.name(), "/var/lib/grafana"),
            ResourceOptions::new().depends_on([network, &image, &data]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
