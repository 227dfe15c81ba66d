//! Miniflux feed reader on PostgreSQL

use crate::config::ConfigStore;
use crate::domain::docker::ContainerSpec;
use crate::domain::output::Output;
use crate::domain::resource::ResourceOptions;
use crate::error::{ConfigError, DeclareError};
use crate::interpolate;
use crate::services::args::{env, sftp_volume, DockerServiceArgs};
use crate::services::docker::{internal_network, pg_isready_slow, registry_image};
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct RssMiniflux {
    pub args: DockerServiceArgs,
    pub postgres_password: Output,
}

impl RssMiniflux {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            postgres_password: store.require_secret("rss_miniflux.postgres_password")?,
        })
    }
}

impl Service for RssMiniflux {
    fn name(&self) -> &str {
        "rss_miniflux"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let miniflux_image =
            registry_image(&mut scope, "miniflux", "miniflux/miniflux:2.0.50", platform)?;
        let postgres_image = registry_image(&mut scope, "miniflux-postgres", "postgres:14", platform)?;

        let data = sftp_volume(&mut scope, storage, "miniflux-data", "rss_miniflux/data")?;

        let internal = internal_network(&mut scope, "miniflux-internal")?;

        let database = scope.declare(
            "miniflux-database",
            ContainerSpec::new(postgres_image.sha256_digest())
                .hostname("miniflux-database")
                .env("POSTGRES_USER=miniflux")
                .env(env("POSTGRES_PASSWORD", &self.postgres_password))
                .network(internal.output_id())
                .volume(data.name(), "/var/lib/postgresql/data")
                .healthcheck(pg_isready_slow("miniflux")),
            ResourceOptions::new().depends_on([&internal, &postgres_image, &data]),
        )?;

        let miniflux = scope.declare(
            "miniflux",
            ContainerSpec::new(miniflux_image.sha256_digest())
                .hostname(self.args.hostname_or("miniflux"))
                .env(interpolate!(
                    "DATABASE_URL=postgres://miniflux:{}@{}/miniflux?sslmode=disable",
                    &self.postgres_password,
                    database.hostname()
                ))
                .env("RUN_MIGRATIONS=1")
                .network(network.output_id())
                .network(internal.output_id()),
            ResourceOptions::new().depends_on([network, &internal, &miniflux_image, &database]),
        )?;

        scope.export("hostname", miniflux.hostname());
        Ok(scope.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{ResourceId, ResourceKind, ResourceSpec};
    use crate::services::testing::docker_fixture;

    #[test]
    fn test_database_url_is_secret_and_points_at_database() {
        let (mut stack, args, _assets) = docker_fixture();
        let miniflux = RssMiniflux {
            args,
            postgres_password: Output::secret("s3cret"),
        };
        miniflux.declare(&mut stack).unwrap();

        let id = ResourceId::new(ResourceKind::Container, "miniflux");
        let ResourceSpec::Container(spec) = &stack.get(&id).unwrap().spec else {
            panic!("miniflux is not a container");
        };
        let url = spec
            .envs
            .iter()
            .find(|e| e.render(true).starts_with("DATABASE_URL="))
            .unwrap();

        assert!(url.is_secret());
        assert_eq!(url.render(false), "[secret]");
        assert_eq!(
            url.render(true),
            "DATABASE_URL=postgres://miniflux:s3cret@${miniflux-database.hostname}/miniflux?sslmode=disable"
        );
    }
}
