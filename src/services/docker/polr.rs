//! Polr URL shortener on MySQL

use crate::config::ConfigStore;
use crate::domain::docker::ContainerSpec;
use crate::domain::output::Output;
use crate::domain::resource::ResourceOptions;
use crate::error::{ConfigError, DeclareError};
use crate::services::args::{env, sftp_volume, DockerServiceArgs};
use crate::services::docker::{internal_network, registry_image};
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Polr {
    pub args: DockerServiceArgs,
    pub mysql_password: Output,
    pub app_name: Output,
    /// Public address short links are generated under
    pub app_address: Output,
    pub admin_username: Output,
    pub admin_password: Output,
}

impl Polr {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            mysql_password: store.require_secret("polr.mysql_password")?,
            app_name: Output::literal(store.get_or("polr.app_name", "polr")),
            app_address: Output::literal(store.require("polr.app_address")?),
            admin_username: Output::literal(store.require("polr.admin_username")?),
            admin_password: store.require_secret("polr.admin_password")?,
        })
    }
}

impl Service for Polr {
    fn name(&self) -> &str {
        "polr"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let polr_image = registry_image(&mut scope, "polr", "ajanvier/polr:latest", platform)?;
        let mysql_image = registry_image(&mut scope, "polr-mysql", "mysql:8", platform)?;

        let data = sftp_volume(&mut scope, storage, "polr-data", "polr/data")?;

        let internal = internal_network(&mut scope, "polr-internal")?;

        let database = scope.declare(
            "polr-database",
            ContainerSpec::new(mysql_image.sha256_digest())
                .hostname("polr-database")
                .envs(["MYSQL_DATABASE=polr", "MYSQL_USER=polr"])
                .env(env("MYSQL_PASSWORD", &self.mysql_password))
                .env("MYSQL_RANDOM_ROOT_PASSWORD=yes")
                .network(internal.output_id())
                .volume(data.name(), "/var/lib/mysql"),
            ResourceOptions::new().depends_on([&internal, &mysql_image, &data]),
        )?;

        let polr = scope.declare(
            "polr",
            ContainerSpec::new(polr_image.sha256_digest())
                .hostname(self.args.hostname_or("polr"))
                .env(env("DB_HOST", database.hostname()))
                .env("DB_DATABASE=polr")
                .env("DB_USERNAME=polr")
                .env(env("DB_PASSWORD", &self.mysql_password))
                .env(env("APP_NAME", &self.app_name))
                .env(env("APP_ADDRESS", &self.app_address))
                .env(env("ADMIN_USERNAME", &self.admin_username))
                .env(env("ADMIN_PASSWORD", &self.admin_password))
                .env("SETTING_SHORTEN_PERMISSION=true")
                .network(network.output_id())
                .network(internal.output_id()),
            ResourceOptions::new().depends_on([network, &internal, &polr_image, &database]),
        )?;

        scope.export("hostname", polr.hostname());
        Ok(scope.finish())
    }
}
