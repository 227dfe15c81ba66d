//! rss-forwarder, built locally, configured from `/data/config.toml`

use crate::domain::docker::ContainerSpec;
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::{sftp_volume, DockerServiceArgs};
use crate::services::docker::local_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct RssForwarder {
    pub args: DockerServiceArgs,
}

impl Service for RssForwarder {
    fn name(&self) -> &str {
        "rss_forwarder"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = local_image(
            &mut scope,
            "rss-forwarder",
            "rss-forwarder",
            &self.args.asset("rss_forwarder/docker"),
            platform,
        )?;
        let data = sftp_volume(&mut scope, storage, "rss-forwarder-data", "rss_forwarder/data")?;

        let container = scope.declare(
            "rss-forwarder",
            ContainerSpec::new(image.image_name())
                .hostname(self.args.hostname_or("rss-forwarder"))
                .command(["rss-forwarder", "--debug", "/data/config.toml"])
                .network(network.output_id())
                .volume(data.name(), "/data"),
            ResourceOptions::new().depends_on([network, &image, &data]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
