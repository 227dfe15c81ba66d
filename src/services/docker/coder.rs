//! Coder workspaces with a dedicated PostgreSQL
//!
//! Coder talks to the host docker daemon through the mounted socket, so the
//! container joins the host's `docker` group.

use crate::config::ConfigStore;
use crate::domain::docker::ContainerSpec;
use crate::domain::output::Output;
use crate::domain::resource::ResourceOptions;
use crate::error::{ConfigError, DeclareError};
use crate::interpolate;
use crate::services::args::{env, sftp_volume, DockerServiceArgs};
use crate::services::docker::{internal_network, pg_isready, registry_image};
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Coder {
    pub args: DockerServiceArgs,
    pub docker_group_id: Output,
    pub postgres_password: Output,
    pub access_url: Output,
    pub wildcard_url: Output,
}

impl Coder {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            docker_group_id: Output::literal(store.require("coder.docker_group_id")?),
            postgres_password: store.require_secret("coder.postgres_password")?,
            access_url: Output::literal(store.require("coder.access_url")?),
            wildcard_url: Output::literal(store.require("coder.wildcard_url")?),
        })
    }
}

impl Service for Coder {
    fn name(&self) -> &str {
        "coder"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let coder_image = registry_image(&mut scope, "coder", "ghcr.io/coder/coder:v2.9.0", platform)?;
        let postgres_image = registry_image(&mut scope, "coder-postgres", "postgres:14", platform)?;

        let data = sftp_volume(&mut scope, storage, "coder-data", "coder/data")?;

        let internal = internal_network(&mut scope, "internal-coder")?;

        let postgres = scope.declare(
            "coder-postgres",
            ContainerSpec::new(postgres_image.sha256_digest())
                .hostname("coder-postgres")
                .network(internal.output_id())
                .volume(data.name(), "/var/lib/postgresql/data")
                .env("POSTGRES_USER=coder")
                .env(env("POSTGRES_PASSWORD", &self.postgres_password))
                .env("POSTGRES_DB=coder")
                .healthcheck(pg_isready("coder", "coder")),
            ResourceOptions::new().depends_on([&internal, &postgres_image, &data]),
        )?;

        let coder = scope.declare(
            "coder",
            ContainerSpec::new(coder_image.sha256_digest())
                .hostname(self.args.hostname_or("coder"))
                .env(interpolate!(
                    "CODER_PG_CONNECTION_URL=postgresql://coder:{}@{}/coder?sslmode=disable",
                    &self.postgres_password,
                    postgres.hostname()
                ))
                .env("CODER_HTTP_ADDRESS=0.0.0.0:7080")
                .env(env("CODER_ACCESS_URL", &self.access_url))
                .env(env("CODER_WILDCARD_ACCESS_URL", &self.wildcard_url))
                .network(network.output_id())
                .network(internal.output_id())
                .network("bridge")
                .host_path("/var/run/docker.sock", "/var/run/docker.sock", false)
                .group_add(&self.docker_group_id),
            ResourceOptions::new().depends_on([network, &coder_image, &internal, &postgres]),
        )?;

        scope.export("hostname", coder.hostname());
        scope.export("database_hostname", postgres.hostname());
        Ok(scope.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{ResourceId, ResourceKind, ResourceSpec};
    use crate::services::testing::docker_fixture;

    #[test]
    fn test_healthcheck_targets_database_not_password() {
        let (mut stack, args, _assets) = docker_fixture();
        let coder = Coder {
            args,
            docker_group_id: Output::literal("998"),
            postgres_password: Output::secret("pg-secret"),
            access_url: Output::literal("https://coder.example.org"),
            wildcard_url: Output::literal("*.coder.example.org"),
        };
        coder.declare(&mut stack).unwrap();

        let id = ResourceId::new(ResourceKind::Container, "coder-postgres");
        let ResourceSpec::Container(spec) = &stack.get(&id).unwrap().spec else {
            panic!("coder-postgres is not a container");
        };
        let check = spec.healthcheck.as_ref().unwrap();
        assert_eq!(check.tests[1].render(true), "pg_isready -U coder -d coder");
        assert!(!check.tests.iter().any(|t| t.render(true).contains("pg-secret")));
    }
}
