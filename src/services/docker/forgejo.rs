//! Forgejo git forge plus an actions runner backed by docker-in-docker

use crate::domain::docker::{ContainerSpec, PortBinding};
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::interpolate;
use crate::services::args::{sftp_volume, DockerServiceArgs};
use crate::services::docker::{internal_network, registry_image};
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Forgejo {
    pub args: DockerServiceArgs,
}

impl Service for Forgejo {
    fn name(&self) -> &str {
        "forgejo"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let forgejo_image = registry_image(
            &mut scope,
            "forgejo",
            "codeberg.org/forgejo/forgejo:1.21.5-0",
            platform,
        )?;
        let runner_image = registry_image(
            &mut scope,
            "forgejo-runner",
            "code.forgejo.org/forgejo/runner:3.3.0",
            platform,
        )?;
        let dind_image = registry_image(&mut scope, "forgejo-dind", "docker:dind", platform)?;

        let data = sftp_volume(&mut scope, storage, "forgejo-data", "forgejo/data")?;
        let runner_data = sftp_volume(&mut scope, storage, "forgejo-runner", "forgejo/runner")?;

        let internal = internal_network(&mut scope, "forgejo-internal")?;

        let dind = scope.declare(
            "forgejo-dind",
            ContainerSpec::new(dind_image.sha256_digest())
                .hostname("forgejo-dind")
                .privileged()
                .command(["dockerd", "-H", "tcp://0.0.0.0:2375", "--tls=false"])
                .network(internal.output_id()),
            ResourceOptions::new().depends_on([&internal, &dind_image]),
        )?;

        scope.declare(
            "forgejo-runner",
            ContainerSpec::new(runner_image.sha256_digest())
                .hostname("forgejo-runner")
                .env(interpolate!("DOCKER_HOST=tcp://{}:2375", dind.hostname()))
                .command(["forgejo-runner", "--config", "config.yml", "daemon"])
                .network(internal.output_id())
                .volume(runner_data.name(), "/data"),
            ResourceOptions::new().depends_on([&internal, &runner_image, &runner_data, &dind]),
        )?;

        let forgejo = scope.declare(
            "forgejo",
            ContainerSpec::new(forgejo_image.sha256_digest())
                .hostname(self.args.hostname_or("forgejo"))
                .envs(["USER_UID=1000", "USER_GID=1000"])
                .port(PortBinding::tcp(22, 22))
                .network(network.output_id())
                .network(internal.output_id())
                .volume(data.name(), "/data")
                .host_path("/etc/timezone", "/etc/timezone", true)
                .host_path("/etc/localtime", "/etc/localtime", true),
            ResourceOptions::new().depends_on([network, &internal, &forgejo_image, &data]),
        )?;

        scope.export("hostname", forgejo.hostname());
        Ok(scope.finish())
    }
}
