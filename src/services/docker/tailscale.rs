//! Tailscale node advertising the container tag
//!
//! State lives on a plain local volume: the node key must not be shared with
//! another host through the remote filesystem.

use crate::config::ConfigStore;
use crate::domain::docker::{ContainerSpec, VolumeSpec};
use crate::domain::output::Output;
use crate::domain::resource::ResourceOptions;
use crate::error::{ConfigError, DeclareError};
use crate::services::args::{env, DockerServiceArgs};
use crate::services::docker::registry_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Tailscale {
    pub args: DockerServiceArgs,
    pub auth_key: Output,
}

impl Tailscale {
    pub fn from_config(args: DockerServiceArgs, store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            args,
            auth_key: store.require_secret("tailscale.auth_key")?,
        })
    }
}

impl Service for Tailscale {
    fn name(&self) -> &str {
        "tailscale"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        self.args.require_base_path(name)?;
        let platform = self.args.require_platform(name)?;

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = registry_image(
            &mut scope,
            "tailscale",
            "ghcr.io/tailscale/tailscale:latest",
            platform,
        )?;
        let state = scope.declare("tailscale-data", VolumeSpec::default(), ResourceOptions::new())?;

        let container = scope.declare(
            "tailscale",
            ContainerSpec::new(image.sha256_digest())
                .hostname(self.args.hostname_or("tailscale"))
                .envs([
                    "TS_EXTRA_ARGS=--advertise-tags=tag:container",
                    "TS_STATE_DIR=/var/lib/tailscale",
                ])
                .env(env("TS_AUTHKEY", &self.auth_key))
                .network(network.output_id())
                .volume(state.name(), "/var/lib/tailscale"),
            ResourceOptions::new().depends_on([network, &image, &state]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}
