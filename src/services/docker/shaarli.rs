//! Shaarli bookmarks with the stack theme and local plugins
//!
//! Plugins are discovered from `assets/shaarli/plugins` when the service is
//! declared; each directory is bind-mounted on its own.

use std::fs;
use std::path::PathBuf;

use crate::domain::docker::ContainerSpec;
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::{sftp_volume, DockerServiceArgs};
use crate::services::docker::registry_image;
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

pub struct Shaarli {
    pub args: DockerServiceArgs,
}

impl Shaarli {
    /// Plugin directory entries, sorted by name
    fn plugins(&self) -> Result<Vec<(String, PathBuf)>, DeclareError> {
        let dir = self.args.asset("shaarli/plugins");
        let entries = fs::read_dir(&dir).map_err(|source| DeclareError::Asset {
            path: dir.clone(),
            source,
        })?;

        let mut plugins = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| DeclareError::Asset {
                path: dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            plugins.push((name, entry.path()));
        }
        plugins.sort();
        Ok(plugins)
    }
}

impl Service for Shaarli {
    fn name(&self) -> &str {
        "shaarli"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;

        let plugins = self.plugins()?;
        let theme = self.args.asset("shaarli/themes/stack/stack");

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let image = registry_image(&mut scope, "shaarli", "ghcr.io/shaarli/shaarli:v0.13.0", platform)?;
        let data = sftp_volume(&mut scope, storage, "shaarli-data", "shaarli/data")?;

        let mut spec = ContainerSpec::new(image.sha256_digest())
            .hostname(self.args.hostname_or("shaarli"))
            .network(network.output_id())
            .volume(data.name(), "/var/www/shaarli/data")
            .host_path(theme.display().to_string(), "/var/www/shaarli/tpl/stack", false);
        for (plugin, path) in &plugins {
            spec = spec.host_path(
                path.display().to_string(),
                format!("/var/www/shaarli/plugins/{}", plugin),
                false,
            );
        }

        let container = scope.declare(
            "shaarli",
            spec,
            ResourceOptions::new().depends_on([network, &image, &data]),
        )?;

        scope.export("hostname", container.hostname());
        Ok(scope.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{ResourceId, ResourceKind, ResourceSpec};
    use crate::services::testing::docker_fixture;

    #[test]
    fn test_plugins_mounted_in_name_order() {
        let (mut stack, args, _assets) = docker_fixture();
        Shaarli { args }.declare(&mut stack).unwrap();

        let id = ResourceId::new(ResourceKind::Container, "shaarli");
        let ResourceSpec::Container(spec) = &stack.get(&id).unwrap().spec else {
            panic!("shaarli is not a container");
        };
        let plugin_mounts: Vec<&str> = spec
            .volumes
            .iter()
            .map(|m| m.container_path.as_str())
            .filter(|p| p.starts_with("/var/www/shaarli/plugins/"))
            .collect();
        assert_eq!(
            plugin_mounts,
            vec!["/var/www/shaarli/plugins/archiveorg", "/var/www/shaarli/plugins/readityourself"]
        );
    }

    #[test]
    fn test_missing_plugin_dir_leaves_stack_untouched() {
        let (mut stack, mut args, _assets) = docker_fixture();
        args.assets_dir = PathBuf::from("/nonexistent/homelab-assets");
        let before = stack.len();

        let err = Shaarli { args }.declare(&mut stack).unwrap_err();
        assert!(matches!(err, DeclareError::Asset { .. }));
        assert_eq!(stack.len(), before);
    }
}
