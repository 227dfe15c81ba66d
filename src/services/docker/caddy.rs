//! Caddy reverse proxy, built from `assets/caddy`
//!
//! Sits on the shared network and publishes 80/443; certificates and ACME
//! state live on the remote filesystem.

use crate::domain::docker::{ContainerSpec, PortBinding};
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::{sftp_volume, DockerServiceArgs};
use crate::services::docker::local_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Caddy {
    pub args: DockerServiceArgs,
}

impl Service for Caddy {
    fn name(&self) -> &str {
        "caddy"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = local_image(&mut scope, "caddy", "caddy", &self.args.asset("caddy"), platform)?;
        let data = sftp_volume(&mut scope, storage, "caddy-data", "caddy/data")?;

        let container = scope.declare(
            "caddy",
            ContainerSpec::new(image.image_name())
                .hostname(self.args.hostname_or("caddy"))
                .entrypoint([
                    "caddy",
                    "run",
                    "--config",
                    "/etc/caddy/Caddyfile",
                    "--adapter",
                    "caddyfile",
                ])
                .port(PortBinding::tcp(80, 80))
                .port(PortBinding::tcp(443, 443))
                .network(network.output_id())
                .volume(data.name(), "/data"),
            ResourceOptions::new().depends_on([network, &image, &data]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
