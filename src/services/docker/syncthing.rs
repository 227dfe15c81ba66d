//! Syncthing file sync

use crate::domain::docker::{ContainerSpec, PortBinding};
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::{env, sftp_volume, DockerServiceArgs};
use crate::services::docker::registry_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

const SYNC_PORT: u16 = 22000;
const DISCOVERY_PORT: u16 = 21027;

pub struct Syncthing {
    pub args: DockerServiceArgs,
}

impl Service for Syncthing {
    fn name(&self) -> &str {
        "syncthing"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = registry_image(
            &mut scope,
            "syncthing",
            "lscr.io/linuxserver/syncthing:1.27.4",
            platform,
        )?;
        let config = sftp_volume(&mut scope, storage, "syncthing-config", "syncthing/config")?;
        let data = sftp_volume(&mut scope, storage, "syncthing-data", "syncthing/data")?;

        let container = scope.declare(
            "syncthing",
            ContainerSpec::new(image.sha256_digest())
                .hostname(self.args.hostname_or("syncthing"))
                .envs(["PUID=1000", "PGID=1000"])
                .env(env("TZ", self.args.timezone.as_str()))
                .port(PortBinding::tcp(SYNC_PORT, SYNC_PORT))
                .port(PortBinding::udp(SYNC_PORT, SYNC_PORT))
                .port(PortBinding::udp(DISCOVERY_PORT, DISCOVERY_PORT))
                .network(network.output_id())
                .volume(config.name(), "/config")
                .volume(data.name(), "/data"),
            ResourceOptions::new().depends_on([network, &image, &config, &data]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
