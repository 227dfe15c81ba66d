//! Homepage dashboard

use crate::domain::docker::ContainerSpec;
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::{sftp_volume, DockerServiceArgs};
use crate::services::docker::registry_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Homepage {
    pub args: DockerServiceArgs,
}

impl Service for Homepage {
    fn name(&self) -> &str {
        "homepage"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = registry_image(
            &mut scope,
            "homepage",
            "ghcr.io/gethomepage/homepage:v0.8.9",
            platform,
        )?;
        let config = sftp_volume(&mut scope, storage, "homepage-config", "homepage/config")?;

        let container = scope.declare(
            "homepage",
            ContainerSpec::new(image.sha256_digest())
                .hostname(self.args.hostname_or("homepage"))
                .envs(["PUID=1000", "PGID=1000"])
                .network(network.output_id())
                .volume(config.name(), "/app/config"),
            ResourceOptions::new().depends_on([network, &image, &config]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
