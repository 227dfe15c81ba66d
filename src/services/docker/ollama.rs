//! Ollama runner with the web UI in front of it

use crate::domain::docker::ContainerSpec;
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::interpolate;
use crate::services::args::{sftp_volume, DockerServiceArgs};
use crate::services::docker::{internal_network, registry_image};
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Ollama {
    pub args: DockerServiceArgs,
}

impl Service for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let webui_image = registry_image(
            &mut scope,
            "ollama",
            "ghcr.io/ollama-webui/ollama-webui:main",
            platform,
        )?;
        let runner_image =
            registry_image(&mut scope, "ollama-runner", "ollama/ollama:latest", platform)?;

        let data = sftp_volume(&mut scope, storage, "ollama", "ollama/data")?;

        let internal = internal_network(&mut scope, "ollama-internal")?;

        let runner = scope.declare(
            "ollama-runner",
            ContainerSpec::new(runner_image.sha256_digest())
                .hostname("ollama-runner")
                .network(internal.output_id()),
            ResourceOptions::new().depends_on([&internal, &runner_image]),
        )?;

        let webui = scope.declare(
            "ollama",
            ContainerSpec::new(webui_image.sha256_digest())
                .hostname(self.args.hostname_or("ollama"))
                .env(interpolate!(
                    "OLLAMA_API_BASE_URL=http://{}:11434/api",
                    runner.hostname()
                ))
                .network(network.output_id())
                .network(internal.output_id())
                .volume(data.name(), "/app/backend/data"),
            ResourceOptions::new().depends_on([network, &internal, &webui_image, &data, &runner]),
        )?;

        scope.export("hostname", webui.hostname());
        Ok(scope.finish())
    }
}
