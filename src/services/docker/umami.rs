//! Umami web analytics on PostgreSQL

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

pub struct Umami {
    pub args: DockerServiceArgs,
    pub postgres_password: Output,
    pub app_secret: Output,
}

impl Umami {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            postgres_password: store.require_secret("umami.postgres_password")?,
            app_secret: store.require_secret("umami.app_secret")?,
        })
    }
}

impl Service for Umami {
    fn name(&self) -> &str {
        "umami"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let umami_image = registry_image(
            &mut scope,
            "umami",
            "ghcr.io/umami-software/umami:postgresql-latest",
            platform,
        )?;
        let postgres_image =
            registry_image(&mut scope, "umami-postgres", "postgres:15-alpine", platform)?;

        let data = sftp_volume(&mut scope, storage, "umami-data", "umami/data")?;

        let internal = internal_network(&mut scope, "umami-internal")?;

        let database = scope.declare(
            "umami-database",
            ContainerSpec::new(postgres_image.sha256_digest())
                .hostname("umami-database")
                .envs(["POSTGRES_DB=umami", "POSTGRES_USER=umami"])
                .env(env("POSTGRES_PASSWORD", &self.postgres_password))
                .network(internal.output_id())
                .volume(data.name(), "/var/lib/postgresql/data")
                .healthcheck(pg_isready_slow("umami")),
            ResourceOptions::new().depends_on([&internal, &postgres_image, &data]),
        )?;

        let umami = scope.declare(
            "umami",
            ContainerSpec::new(umami_image.sha256_digest())
                .hostname(self.args.hostname_or("umami"))
                .env(interpolate!(
                    "DATABASE_URL=postgres://umami:{}@{}:5432/umami",
                    &self.postgres_password,
                    database.hostname()
                ))
                .env("DATABASE_TYPE=postgresql")
                .env(env("APP_SECRET", &self.app_secret))
                .network(network.output_id())
                .network(internal.output_id()),
            ResourceOptions::new().depends_on([network, &internal, &umami_image, &database]),
        )?;

        scope.export("hostname", umami.hostname());
        Ok(scope.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{ResourceId, ResourceKind};
    use crate::services::testing::docker_fixture;

    #[test]
    fn test_database_waits_for_volume_and_app_waits_for_database() {
        let (mut stack, args, _assets) = docker_fixture();
        let umami = Umami {
            args,
            postgres_password: Output::secret("pw"),
            app_secret: Output::secret("app"),
        };
        let component = umami.declare(&mut stack).unwrap();
        assert_eq!(component.resources.len(), 6);

        let db = stack
            .get(&ResourceId::new(ResourceKind::Container, "umami-database"))
            .unwrap();
        assert!(db
            .depends_on
            .contains(&ResourceId::new(ResourceKind::Volume, "umami-data")));

        let app = stack
            .get(&ResourceId::new(ResourceKind::Container, "umami"))
            .unwrap();
        assert!(app.depends_on.contains(&db.id));
    }
}
