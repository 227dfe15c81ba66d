//! Filestash web file manager with an OnlyOffice document server

use crate::config::ConfigStore;
use crate::domain::docker::ContainerSpec;
use crate::domain::output::Output;
use crate::domain::resource::ResourceOptions;
use crate::error::{ConfigError, DeclareError};
use crate::interpolate;
use crate::services::args::{env, sftp_volume, DockerServiceArgs};
use crate::services::docker::{internal_network, registry_image};
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Filestash {
    pub args: DockerServiceArgs,
    pub config_secret: Output,
}

impl Filestash {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            config_secret: store.require_secret("filestash.config_secret")?,
        })
    }
}

impl Service for Filestash {
    fn name(&self) -> &str {
        "filestash"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let filestash_image =
            registry_image(&mut scope, "filestash", "machines/filestash:latest", platform)?;
        let onlyoffice_image = registry_image(
            &mut scope,
            "filestash-onlyoffice",
            "onlyoffice/documentserver:latest",
            platform,
        )?;

        let config = sftp_volume(&mut scope, storage, "filestash-config", "filestash/config")?;

        let internal = internal_network(&mut scope, "filestash-internal")?;

        let onlyoffice = scope.declare(
            "filestash-onlyoffice",
            ContainerSpec::new(onlyoffice_image.sha256_digest())
                .hostname("onlyoffice")
                .network(internal.output_id()),
            ResourceOptions::new().depends_on([&internal, &onlyoffice_image]),
        )?;

        let filestash = scope.declare(
            "filestash",
            ContainerSpec::new(filestash_image.sha256_digest())
                .hostname(self.args.hostname_or("filestash"))
                .env("APPLICATION_URL=")
                .env(interpolate!("ONLYOFFICE_URL=http://{}", onlyoffice.hostname()))
                .env(env("CONFIG_SECRET", &self.config_secret))
                .network(network.output_id())
                .network(internal.output_id())
                .volume(config.name(), "/app/data/state"),
            ResourceOptions::new().depends_on([
                network,
                &internal,
                &filestash_image,
                &config,
                &onlyoffice,
            ]),
        )?;

        scope.export("hostname", filestash.hostname());
        Ok(scope.finish())
    }
}
