//! RSS-Bridge built from source, with a feed whitelist from the assets
//! directory

use crate::domain::docker::ContainerSpec;
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::DockerServiceArgs;
use crate::services::docker::local_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct RssBridge {
    pub args: DockerServiceArgs,
}

impl Service for RssBridge {
    fn name(&self) -> &str {
        "rss_bridge"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let platform = self.args.require_platform(name)?;

        let whitelist = self.args.asset("rss_bridge/whitelist.txt");

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = local_image(
            &mut scope,
            "rss-bridge",
            "rss-bridge",
            &self.args.asset("rss_bridge/source"),
            platform,
        )?;

        let container = scope.declare(
            "rss-bridge",
            ContainerSpec::new(image.image_name())
                .hostname(self.args.hostname_or("rss-bridge"))
                .network(network.output_id())
                .host_path(whitelist.display().to_string(), "/app/whitelist.txt", false),
            ResourceOptions::new().depends_on([network, &image]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
