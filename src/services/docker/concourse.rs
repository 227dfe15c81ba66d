//! Concourse CI: web node, one containerd worker, PostgreSQL

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

const POSTGRES_USER: &str = "concourse_user";
const POSTGRES_DB: &str = "concourse";

pub struct Concourse {
    pub args: DockerServiceArgs,
    pub postgres_password: Output,
    /// `user:password` pairs for `CONCOURSE_ADD_LOCAL_USER`
    pub add_local_user: Output,
    pub main_team_local_user: Output,
    pub external_url: String,
}

impl Concourse {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            postgres_password: store.require_secret("concourse.postgres_password")?,
            add_local_user: store.require_secret("concourse.add_local_user")?,
            main_team_local_user: Output::literal(store.require("concourse.main_team_local_user")?),
            external_url: store.get_or("concourse.external_url", "http://localhost:8080"),
        })
    }
}

impl Service for Concourse {
    fn name(&self) -> &str {
        "concourse"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let concourse_image =
            registry_image(&mut scope, "concourse", "concourse/concourse:7.11.1", platform)?;
        let postgres_image =
            registry_image(&mut scope, "concourse-postgres", "postgres:15-alpine", platform)?;

        let data = sftp_volume(&mut scope, storage, "concourse-data", "concourse/data")?;
        let keys = sftp_volume(&mut scope, storage, "concourse-keys", "concourse/keys")?;

        let internal = internal_network(&mut scope, "concourse-internal")?;

        let postgres = scope.declare(
            "concourse-postgres",
            ContainerSpec::new(postgres_image.sha256_digest())
                .hostname("concourse-db")
                .env(format!("POSTGRES_USER={}", POSTGRES_USER))
                .env(env("POSTGRES_PASSWORD", &self.postgres_password))
                .env(format!("POSTGRES_DB={}", POSTGRES_DB))
                .env("PGDATA=/database")
                .network(internal.output_id())
                .volume(data.name(), "/database"),
            ResourceOptions::new().depends_on([&internal, &postgres_image, &data]),
        )?;

        let web = scope.declare(
            "concourse",
            ContainerSpec::new(concourse_image.sha256_digest())
                .hostname(self.args.hostname_or("concourse"))
                .command(["web"])
                .envs([
                    "CONCOURSE_SESSION_SIGNING_KEY=/concourse-keys/session_signing_key",
                    "CONCOURSE_TSA_AUTHORIZED_KEYS=/concourse-keys/authorized_worker_keys",
                    "CONCOURSE_TSA_HOST_KEY=/concourse-keys/tsa_host_key",
                ])
                .env(env("CONCOURSE_POSTGRES_HOST", postgres.hostname()))
                .env(format!("CONCOURSE_POSTGRES_USER={}", POSTGRES_USER))
                .env(env("CONCOURSE_POSTGRES_PASSWORD", &self.postgres_password))
                .env(format!("CONCOURSE_POSTGRES_DATABASE={}", POSTGRES_DB))
                .env(env("CONCOURSE_EXTERNAL_URL", &self.external_url))
                .env(env("CONCOURSE_ADD_LOCAL_USER", &self.add_local_user))
                .env(env("CONCOURSE_MAIN_TEAM_LOCAL_USER", &self.main_team_local_user))
                .env("CONCOURSE_CLUSTER_NAME=dev")
                .network(network.output_id())
                .network(internal.output_id())
                .volume(keys.name(), "/concourse-keys"),
            ResourceOptions::new().depends_on([
                network,
                &internal,
                &concourse_image,
                &keys,
                &postgres,
            ]),
        )?;

        scope.declare(
            "concourse-worker",
            ContainerSpec::new(concourse_image.sha256_digest())
                .hostname("concourse-worker")
                .command(["worker"])
                .privileged()
                .envs([
                    "CONCOURSE_RUNTIME=containerd",
                    "CONCOURSE_TSA_PUBLIC_KEY=/concourse-keys/tsa_host_key.pub",
                    "CONCOURSE_TSA_WORKER_PRIVATE_KEY=/concourse-keys/worker_key",
                ])
                .env(interpolate!("CONCOURSE_TSA_HOST={}:2222", web.hostname()))
                .envs([
                    "CONCOURSE_BIND_IP=0.0.0.0",
                    "CONCOURSE_BAGGAGECLAIM_BIND_IP=0.0.0.0",
                    "CONCOURSE_BAGGAGECLAIM_DRIVER=overlay",
                    "CONCOURSE_CONTAINERD_DNS_PROXY_ENABLE=true",
                ])
                .network(internal.output_id())
                .volume(keys.name(), "/concourse-keys"),
            ResourceOptions::new().depends_on([&internal, &concourse_image, &keys, &web]),
        )?;

        scope.export("hostname", web.hostname());
        scope.export("external_url", self.external_url.as_str());
        Ok(scope.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{ResourceId, ResourceKind, ResourceSpec};
    use crate::services::testing::docker_fixture;

    #[test]
    fn test_database_user_matches_web_config() {
        let (mut stack, args, _assets) = docker_fixture();
        let concourse = Concourse {
            args,
            postgres_password: Output::secret("pw"),
            add_local_user: Output::secret("admin:admin"),
            main_team_local_user: Output::literal("admin"),
            external_url: "https://ci.example.org".to_string(),
        };
        concourse.declare(&mut stack).unwrap();

        let envs = |name: &str| -> Vec<String> {
            let id = ResourceId::new(ResourceKind::Container, name);
            match &stack.get(&id).unwrap().spec {
                ResourceSpec::Container(spec) => spec.envs.iter().map(|e| e.render(true)).collect(),
                _ => panic!("{} is not a container", name),
            }
        };

        assert!(envs("concourse-postgres").contains(&"POSTGRES_USER=concourse_user".to_string()));
        assert!(envs("concourse").contains(&"CONCOURSE_POSTGRES_USER=concourse_user".to_string()));
        assert!(envs("concourse").contains(&"CONCOURSE_EXTERNAL_URL=https://ci.example.org".to_string()));
        assert!(envs("concourse-worker")
            .contains(&"CONCOURSE_TSA_HOST=${concourse.hostname}:2222".to_string()));
    }
}
