//! Kubo IPFS node with the swarm port published on all interfaces

use crate::domain::docker::{ContainerSpec, PortBinding};
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::{sftp_volume, DockerServiceArgs};
use crate::services::docker::registry_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

const SWARM_PORT: u16 = 4001;

pub struct Ipfs {
    pub args: DockerServiceArgs,
}

impl Service for Ipfs {
    fn name(&self) -> &str {
        "ipfs"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = registry_image(&mut scope, "ipfs", "ipfs/kubo:latest", platform)?;
        let data = sftp_volume(&mut scope, storage, "ipfs-data", "ipfs/data")?;

        let container = scope.declare(
            "ipfs",
            ContainerSpec::new(image.sha256_digest())
                .hostname(self.args.hostname_or("ipfs"))
                .env("IPFS_PROFILE=server")
                .port(PortBinding::tcp(SWARM_PORT, SWARM_PORT).on_ip("0.0.0.0"))
                .port(PortBinding::udp(SWARM_PORT, SWARM_PORT).on_ip("0.0.0.0"))
                .network(network.output_id())
                .volume(data.name(), "/data/ipfs"),
            ResourceOptions::new().depends_on([network, &image, &data]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
