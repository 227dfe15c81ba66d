//! docker provisioner
//!
//! Images are pulled or built, networks and volumes are created when absent,
//! containers are always replaced.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::domain::docker::{ContainerSpec, ImageSpec, NetworkSpec, RegistryImageSpec, VolumeSpec};
use crate::domain::output::{Attribute, Output};
use crate::domain::resource::{ProviderFamily, Resource, ResourceSpec};
use crate::error::ProvisionError;
use crate::infra::command::{CommandOutput, CommandRunner};
use crate::infra::docker_cli;
use crate::state::ResolvedOutputs;

use super::{ApplyContext, Provisioner};

const IMAGE_FORMAT: &str = "{{.Id}}|{{join .RepoDigests \",\"}}";

pub struct DockerProvisioner {
    bin: String,
}

impl DockerProvisioner {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn docker(
        &self,
        ctx: &ApplyContext,
        args: &[String],
    ) -> Result<CommandOutput, ProvisionError> {
        let output = CommandRunner::run_with_streaming(
            &self.bin,
            args,
            None,
            ctx.log_tx.as_ref(),
            &ctx.cancel_token,
            ctx.timeout,
        )
        .await?;
        Ok(output)
    }

    /// Runs the command and turns a non-zero exit into an error
    async fn docker_ok(
        &self,
        ctx: &ApplyContext,
        args: &[String],
    ) -> Result<CommandOutput, ProvisionError> {
        let output = self.docker(ctx, args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ProvisionError::CommandFailed {
                program: self.bin.clone(),
                args: docker_cli::redacted(args),
                code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Like `docker_ok`, but a missing object counts as success
    async fn docker_ignore_missing(
        &self,
        ctx: &ApplyContext,
        args: &[String],
    ) -> Result<(), ProvisionError> {
        let output = self.docker(ctx, args).await?;
        if output.success() || docker_cli::is_not_found(&output.stderr) {
            return Ok(());
        }
        Err(ProvisionError::CommandFailed {
            program: self.bin.clone(),
            args: args.join(" "),
            code: output.status.code(),
            stderr: output.stderr.trim().to_string(),
        })
    }

    /// `Id` and `RepoDigest` of a local image
    async fn inspect_image(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        image: &str,
    ) -> Result<(String, Option<String>), ProvisionError> {
        let output = self
            .docker_ok(ctx, &docker_cli::inspect_args("image", image, IMAGE_FORMAT))
            .await?;
        parse_image_inspect(output.stdout_trimmed()).ok_or_else(|| ProvisionError::Inspect {
            resource: resource.id.clone(),
            message: format!("unexpected image inspect output: {}", output.stdout_trimmed()),
        })
    }

    async fn pull(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        spec: &RegistryImageSpec,
    ) -> Result<BTreeMap<Attribute, String>, ProvisionError> {
        ctx.log_stdout(&format!(">>> docker pull {}", spec.name));
        self.docker_ok(ctx, &docker_cli::pull_args(&spec.name, spec.platform.as_deref()))
            .await?;

        let (id, repo_digest) = self.inspect_image(ctx, resource, &spec.name).await?;
        Ok(BTreeMap::from([
            (Attribute::Name, spec.name.clone()),
            (Attribute::RepoDigest, repo_digest.unwrap_or_else(|| id.clone())),
            (Attribute::Sha256Digest, id.clone()),
            (Attribute::Id, id),
        ]))
    }

    async fn build(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        spec: &ImageSpec,
    ) -> Result<BTreeMap<Attribute, String>, ProvisionError> {
        ctx.log_stdout(&format!(
            ">>> docker build -t {} {}",
            spec.image_name,
            spec.context.display()
        ));
        self.docker_ok(ctx, &docker_cli::build_args(spec)).await?;

        let (id, repo_digest) = self.inspect_image(ctx, resource, &spec.image_name).await?;
        Ok(BTreeMap::from([
            (Attribute::Name, spec.image_name.clone()),
            (Attribute::ImageName, spec.image_name.clone()),
            (Attribute::RepoDigest, repo_digest.unwrap_or_else(|| id.clone())),
            (Attribute::Sha256Digest, id.clone()),
            (Attribute::Id, id),
        ]))
    }

    async fn network(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        spec: &NetworkSpec,
    ) -> Result<BTreeMap<Attribute, String>, ProvisionError> {
        let name = resource.name();
        let existing = self
            .docker(ctx, &docker_cli::inspect_args("network", name, "{{.Id}}"))
            .await?;

        let id = if existing.success() {
            debug!(network = %name, "Network already exists");
            existing.stdout_trimmed().to_string()
        } else {
            let created = self
                .docker_ok(ctx, &docker_cli::network_create_args(name, spec))
                .await?;
            info!(network = %name, "Network created");
            created.stdout_trimmed().to_string()
        };

        Ok(BTreeMap::from([
            (Attribute::Id, id),
            (Attribute::Name, name.to_string()),
        ]))
    }

    async fn volume(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        spec: &VolumeSpec,
        outputs: &ResolvedOutputs,
    ) -> Result<BTreeMap<Attribute, String>, ProvisionError> {
        let name = resource.name();
        let inspect = docker_cli::inspect_args("volume", name, "{{.Mountpoint}}");
        let mut mountpoint = self.docker(ctx, &inspect).await?;

        if !mountpoint.success() {
            let opts = spec
                .driver_opts
                .iter()
                .map(|(key, value)| Ok((key.as_str(), value.resolve(outputs)?)))
                .collect::<Result<Vec<_>, ProvisionError>>()?;
            let args = docker_cli::volume_create_args(name, spec.driver.as_deref(), opts);
            // driver options carry the sftp password
            let created = self.docker(ctx, &args).await?;
            if !created.success() {
                return Err(ProvisionError::CommandFailed {
                    program: self.bin.clone(),
                    args: format!("volume create {}", name),
                    code: created.status.code(),
                    stderr: created.stderr.trim().to_string(),
                });
            }
            info!(volume = %name, driver = ?spec.driver, "Volume created");
            mountpoint = self.docker_ok(ctx, &inspect).await?;
        }

        Ok(BTreeMap::from([
            (Attribute::Id, name.to_string()),
            (Attribute::Name, name.to_string()),
            (Attribute::Mountpoint, mountpoint.stdout_trimmed().to_string()),
        ]))
    }

    async fn container(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        spec: &ContainerSpec,
        outputs: &ResolvedOutputs,
    ) -> Result<BTreeMap<Attribute, String>, ProvisionError> {
        let name = resource.name();
        let resolve = |o: &Output| o.resolve(outputs);
        let create = docker_cli::container_create_args(name, spec, &resolve)?;
        let connects = docker_cli::network_connect_args(name, spec, &resolve)?;

        self.docker_ignore_missing(ctx, &docker_cli::remove_container_args(name))
            .await?;

        ctx.log_stdout(&format!(">>> docker create --name {}", name));
        let created = self.docker_ok(ctx, &create).await?;
        for args in &connects {
            self.docker_ok(ctx, args).await?;
        }
        self.docker_ok(ctx, &docker_cli::start_args(name)).await?;
        info!(container = %name, networks = spec.networks.len(), "Container started");

        Ok(BTreeMap::from([
            (Attribute::Id, created.stdout_trimmed().to_string()),
            (Attribute::Name, name.to_string()),
            (
                Attribute::Hostname,
                spec.hostname.clone().unwrap_or_else(|| name.to_string()),
            ),
        ]))
    }

    fn unsupported(resource: &Resource) -> ProvisionError {
        ProvisionError::Unsupported {
            resource: resource.id.clone(),
            provider: ProviderFamily::Docker.as_str(),
        }
    }
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Docker
    }

    async fn provision(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        outputs: &ResolvedOutputs,
    ) -> Result<BTreeMap<Attribute, String>, ProvisionError> {
        if ctx.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        match &resource.spec {
            ResourceSpec::RegistryImage(spec) => self.pull(ctx, resource, spec).await,
            ResourceSpec::Image(spec) => self.build(ctx, resource, spec).await,
            ResourceSpec::Network(spec) => self.network(ctx, resource, spec).await,
            ResourceSpec::Volume(spec) => self.volume(ctx, resource, spec, outputs).await,
            ResourceSpec::Container(spec) => self.container(ctx, resource, spec, outputs).await,
            _ => Err(Self::unsupported(resource)),
        }
    }

    async fn destroy(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        _outputs: &ResolvedOutputs,
    ) -> Result<(), ProvisionError> {
        if ctx.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        let name = resource.name();
        match &resource.spec {
            // images stay in the local cache
            ResourceSpec::RegistryImage(_) | ResourceSpec::Image(_) => {
                debug!(resource = %resource.id, "Keeping image");
                Ok(())
            }
            ResourceSpec::Container(_) => {
                self.docker_ignore_missing(ctx, &docker_cli::remove_container_args(name))
                    .await
            }
            ResourceSpec::Network(_) => {
                self.docker_ignore_missing(ctx, &docker_cli::remove_args("network", name))
                    .await
            }
            ResourceSpec::Volume(_) => {
                self.docker_ignore_missing(ctx, &docker_cli::remove_args("volume", name))
                    .await
            }
            _ => Err(Self::unsupported(resource)),
        }
    }
}

/// Parses `<id>|<digest>,<digest>` from `docker image inspect`
fn parse_image_inspect(stdout: &str) -> Option<(String, Option<String>)> {
    let (id, digests) = stdout.split_once('|')?;
    if id.is_empty() {
        return None;
    }
    let repo_digest = digests
        .split(',')
        .map(str::trim)
        .find(|d| !d.is_empty())
        .map(str::to_string);
    Some((id.to_string(), repo_digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kube::NamespaceSpec;
    use crate::domain::resource::ResourceOptions;
    use crate::state::Stack;

    #[test]
    fn test_parse_image_inspect() {
        let (id, digest) =
            parse_image_inspect("sha256:aaa|postgres@sha256:bbb,postgres@sha256:ccc").unwrap();
        assert_eq!(id, "sha256:aaa");
        assert_eq!(digest.as_deref(), Some("postgres@sha256:bbb"));

        let (_, digest) = parse_image_inspect("sha256:aaa|").unwrap();
        assert_eq!(digest, None);

        assert!(parse_image_inspect("garbage").is_none());
    }

    #[tokio::test]
    async fn test_kube_resources_are_rejected() {
        let mut stack = Stack::new("test");
        let ns = stack
            .declare("registry", NamespaceSpec::default(), ResourceOptions::new())
            .unwrap();
        let resource = stack.get(ns.id()).unwrap();

        let err = DockerProvisioner::new("docker")
            .provision(&ApplyContext::new("test"), resource, &ResolvedOutputs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Unsupported { provider: "docker", .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_surfaces_command_error() {
        let mut stack = Stack::new("test");
        let net = stack
            .declare("proxy", NetworkSpec::default(), ResourceOptions::new())
            .unwrap();
        let resource = stack.get(net.id()).unwrap();

        let err = DockerProvisioner::new("nonexistent_docker_12345")
            .provision(&ApplyContext::new("test"), resource, &ResolvedOutputs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Command(_)));
    }
}
