//! kubernetes provisioner
//!
//! Manifests are rendered to YAML and piped to `kubectl apply -f -`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

use crate::domain::output::{Attribute, Output};
use crate::domain::resource::{ProviderFamily, Resource};
use crate::error::{ProvisionError, RenderError, ResolveError};
use crate::infra::command::CommandRunner;
use crate::infra::kubectl;
use crate::services::plan::Plan;
use crate::state::{ResolvedOutputs, Stack};

use super::{ApplyContext, Provisioner};

pub struct KubeProvisioner {
    bin: String,
}

impl KubeProvisioner {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn kubectl(
        &self,
        ctx: &ApplyContext,
        args: Vec<String>,
        manifest: &str,
    ) -> Result<(), ProvisionError> {
        let output = CommandRunner::run_with_input(
            &self.bin,
            &args,
            manifest,
            ctx.log_tx.as_ref(),
            &ctx.cancel_token,
            ctx.timeout,
        )
        .await?;

        if output.success() {
            Ok(())
        } else {
            Err(ProvisionError::CommandFailed {
                program: self.bin.clone(),
                args: args.join(" "),
                code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

fn unsupported(resource: &Resource) -> ProvisionError {
    ProvisionError::Unsupported {
        resource: resource.id.clone(),
        provider: ProviderFamily::Kubernetes.as_str(),
    }
}

/// Only what `kubectl delete` needs to find the object
fn identity(manifest: &Value) -> Value {
    json!({
        "apiVersion": manifest["apiVersion"],
        "kind": manifest["kind"],
        "metadata": manifest["metadata"],
    })
}

#[async_trait]
impl Provisioner for KubeProvisioner {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Kubernetes
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
        let meta = resource.spec.metadata().ok_or_else(|| unsupported(resource))?;
        let name = meta.effective_name(resource.name()).to_string();

        let manifest = resource
            .spec
            .render(resource.name(), &|o: &Output| o.resolve(outputs))?;
        let yaml = serde_yaml::to_string(&manifest)?;

        self.kubectl(ctx, kubectl::apply_args(resource.provider.as_ref()), &yaml)
            .await?;
        info!(resource = %resource.id, name = %name, "Manifest applied");

        Ok([Attribute::Id, Attribute::Name, Attribute::MetadataName]
            .into_iter()
            .map(|attr| (attr, name.clone()))
            .collect())
    }

    async fn destroy(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        outputs: &ResolvedOutputs,
    ) -> Result<(), ProvisionError> {
        if ctx.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        if resource.spec.metadata().is_none() {
            return Err(unsupported(resource));
        }

        // image digests and similar are unknown at teardown; only metadata matters
        let lenient = |o: &Output| -> Result<String, ResolveError> {
            Ok(o.resolve(outputs).unwrap_or_else(|_| o.render(false)))
        };
        let manifest = resource.spec.render(resource.name(), &lenient)?;
        let yaml = serde_yaml::to_string(&identity(&manifest))?;

        self.kubectl(ctx, kubectl::delete_args(resource.provider.as_ref()), &yaml)
            .await
    }
}

/// Multi-document YAML of every kubernetes resource, in plan order
///
/// References to other resources print as `${name.attr}`.
pub fn manifests(stack: &Stack, plan: &Plan, reveal_secrets: bool) -> Result<String, RenderError> {
    let resolve = |o: &Output| -> Result<String, ResolveError> { Ok(o.render(reveal_secrets)) };
    let mut documents = Vec::new();

    for (_, id) in plan.steps() {
        let Some(resource) = stack.get(id) else {
            continue;
        };
        if resource.kind().provider() != ProviderFamily::Kubernetes {
            continue;
        }
        let manifest = resource.spec.render(resource.name(), &resolve)?;
        documents.push(serde_yaml::to_string(&manifest)?);
    }

    Ok(documents
        .iter()
        .map(|doc| format!("---\n{}", doc))
        .collect::<String>())
}
