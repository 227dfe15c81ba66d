//! Provisioning
//!
//! Walks a [`Plan`] wave by wave. Every resource in a wave is handed to the
//! provisioner of its provider family concurrently; the outputs it reports
//! feed the deferred values of later waves. The first failure stops the run
//! once the current wave has settled and the remaining steps are skipped.

pub mod context;
pub mod docker;
pub mod kube;

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::EnvConfig;
use crate::domain::apply::{ApplyReport, ApplyStep, RunStatus};
use crate::domain::output::Attribute;
use crate::domain::resource::{ProviderFamily, Resource, ResourceId, ResourceSpec};
use crate::error::ProvisionError;
use crate::infra::command::CommandError;
use crate::services::plan::Plan;
use crate::state::{ResolvedOutputs, Stack};

pub use context::ApplyContext;
pub use docker::DockerProvisioner;
pub use kube::{manifests, KubeProvisioner};

/// Creates and removes the resources of one provider family
#[async_trait]
pub trait Provisioner: Send + Sync {
    fn family(&self) -> ProviderFamily;

    /// Creates or replaces `resource` and reports its outputs
    async fn provision(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        outputs: &ResolvedOutputs,
    ) -> Result<BTreeMap<Attribute, String>, ProvisionError>;

    /// Removes `resource`; a resource that is already gone is not an error
    async fn destroy(
        &self,
        ctx: &ApplyContext,
        resource: &Resource,
        outputs: &ResolvedOutputs,
    ) -> Result<(), ProvisionError>;
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Runs plans against a set of provisioners
#[derive(Default)]
pub struct Applier {
    provisioners: Vec<Arc<dyn Provisioner>>,
}

impl Applier {
    pub fn new() -> Self {
        Self::default()
    }

    /// docker and kubectl provisioners using the binaries from the environment
    pub fn from_env(env: &EnvConfig) -> Self {
        Self::new()
            .with_provisioner(DockerProvisioner::new(&env.docker_bin))
            .with_provisioner(KubeProvisioner::new(&env.kubectl_bin))
    }

    pub fn with_provisioner(mut self, provisioner: impl Provisioner + 'static) -> Self {
        self.provisioners.push(Arc::new(provisioner));
        self
    }

    fn provisioner(&self, family: ProviderFamily) -> Option<&dyn Provisioner> {
        self.provisioners
            .iter()
            .find(|p| p.family() == family)
            .map(|p| p.as_ref())
    }

    /// Creates every resource of the plan
    pub async fn apply(&self, ctx: &ApplyContext, stack: &Stack, plan: &Plan) -> ApplyReport {
        info!(run_id = %ctx.run_id, stack = %stack.name(), resources = plan.len(), "Apply started");
        let report = self
            .run(ctx, stack, plan.waves().to_vec(), ResolvedOutputs::default(), Direction::Up)
            .await;
        info!(run_id = %ctx.run_id, status = report.status.as_str(), "Apply finished");
        report
    }

    /// Removes every resource of the plan, dependents first
    pub async fn destroy(&self, ctx: &ApplyContext, stack: &Stack, plan: &Plan) -> ApplyReport {
        info!(run_id = %ctx.run_id, stack = %stack.name(), resources = plan.len(), "Destroy started");
        let report = self
            .run(ctx, stack, plan.reversed(), known_outputs(stack), Direction::Down)
            .await;
        info!(run_id = %ctx.run_id, status = report.status.as_str(), "Destroy finished");
        report
    }

    async fn run(
        &self,
        ctx: &ApplyContext,
        stack: &Stack,
        waves: Vec<Vec<ResourceId>>,
        mut outputs: ResolvedOutputs,
        direction: Direction,
    ) -> ApplyReport {
        let mut report = ApplyReport::new(ctx.run_id.clone(), stack.name().to_string());
        report.steps = waves
            .iter()
            .enumerate()
            .flat_map(|(wave, ids)| ids.iter().map(move |id| ApplyStep::new(id.clone(), wave)))
            .collect();

        let mut status = RunStatus::Success;
        let mut offset = 0;

        for (index, wave) in waves.iter().enumerate() {
            let steps = &mut report.steps[offset..offset + wave.len()];
            offset += wave.len();

            if status == RunStatus::Success && ctx.is_cancelled() {
                warn!(run_id = %ctx.run_id, wave = index, "Run cancelled");
                status = RunStatus::Cancelled;
            }
            if status != RunStatus::Success {
                let reason = match status {
                    RunStatus::Cancelled => "cancelled",
                    _ => "skipped after an earlier failure",
                };
                for step in steps.iter_mut() {
                    step.skip(Some(reason.to_string()));
                }
                continue;
            }

            debug!(wave = index, resources = wave.len(), "Starting wave");
            for step in steps.iter_mut() {
                step.start();
            }

            let snapshot = &outputs;
            let results = join_all(
                wave.iter()
                    .map(|id| self.run_one(ctx, stack, id, snapshot, direction)),
            )
            .await;

            for ((step, id), result) in steps.iter_mut().zip(wave).zip(results) {
                match result {
                    Ok(attrs) => {
                        if let Direction::Up = direction {
                            outputs.extend_resource(id, attrs);
                        }
                        step.finish(true, None);
                    }
                    Err(e) if is_cancellation(&e) => {
                        step.finish(false, Some(e.to_string()));
                        status = RunStatus::Cancelled;
                    }
                    Err(e) => {
                        error!(resource = %id, error = %e, "Resource failed");
                        ctx.log_stderr(&format!("{}: {}", id, e));
                        step.finish(false, Some(e.to_string()));
                        if status == RunStatus::Success {
                            status = RunStatus::Failed;
                        }
                    }
                }
            }
        }

        report.complete(status);
        report
    }

    async fn run_one(
        &self,
        ctx: &ApplyContext,
        stack: &Stack,
        id: &ResourceId,
        outputs: &ResolvedOutputs,
        direction: Direction,
    ) -> Result<BTreeMap<Attribute, String>, ProvisionError> {
        let resource = stack.get(id).ok_or_else(|| ProvisionError::Inspect {
            resource: id.clone(),
            message: "not declared in this stack".to_string(),
        })?;
        let family = id.kind().provider();
        let provisioner = self
            .provisioner(family)
            .ok_or_else(|| ProvisionError::Unsupported {
                resource: id.clone(),
                provider: family.as_str(),
            })?;

        match direction {
            Direction::Up => {
                debug!(resource = %id, "Provisioning");
                let attrs = provisioner.provision(ctx, resource, outputs).await?;
                info!(resource = %id, outputs = attrs.len(), "Provisioned");
                Ok(attrs)
            }
            Direction::Down => {
                debug!(resource = %id, "Destroying");
                provisioner.destroy(ctx, resource, outputs).await?;
                info!(resource = %id, "Destroyed");
                Ok(BTreeMap::new())
            }
        }
    }
}

fn is_cancellation(err: &ProvisionError) -> bool {
    matches!(
        err,
        ProvisionError::Cancelled | ProvisionError::Command(CommandError::Cancelled)
    )
}

/// Outputs that follow from the declarations alone
///
/// Used by destroy, where nothing has been provisioned in this run: names are
/// the logical names, kubernetes objects are addressed by metadata name.
pub fn known_outputs(stack: &Stack) -> ResolvedOutputs {
    let mut outputs = ResolvedOutputs::default();
    for resource in stack.resources() {
        let id = &resource.id;
        if let Some(meta) = resource.spec.metadata() {
            let name = meta.effective_name(resource.name());
            for attr in [Attribute::Id, Attribute::Name, Attribute::MetadataName] {
                outputs.insert(id, attr, name);
            }
            continue;
        }
        match &resource.spec {
            ResourceSpec::RegistryImage(spec) => {
                outputs.insert(id, Attribute::Name, spec.name.as_str());
            }
            ResourceSpec::Image(spec) => {
                outputs.insert(id, Attribute::Name, spec.image_name.as_str());
                outputs.insert(id, Attribute::ImageName, spec.image_name.as_str());
            }
            ResourceSpec::Container(spec) => {
                outputs.insert(id, Attribute::Name, resource.name());
                outputs.insert(
                    id,
                    Attribute::Hostname,
                    spec.hostname.as_deref().unwrap_or(resource.name()),
                );
            }
            _ => {
                outputs.insert(id, Attribute::Id, resource.name());
                outputs.insert(id, Attribute::Name, resource.name());
            }
        }
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::apply::StepStatus;
    use crate::domain::docker::{ContainerSpec, NetworkSpec, RegistryImageSpec, VolumeSpec};
    use crate::domain::kube::{NamespaceSpec, ObjectMeta};
    use crate::domain::output::Output;
    use crate::domain::resource::{ResourceKind, ResourceOptions};
    use crate::interpolate;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Records calls and reports `<attr>-<name>` for every attribute
    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
        seen_envs: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Provisioner for Recorder {
        fn family(&self) -> ProviderFamily {
            ProviderFamily::Docker
        }

        async fn provision(
            &self,
            _ctx: &ApplyContext,
            resource: &Resource,
            outputs: &ResolvedOutputs,
        ) -> Result<BTreeMap<Attribute, String>, ProvisionError> {
            self.calls.lock().unwrap().push(format!("up {}", resource.name()));
            if self.fail_on == Some(resource.name()) {
                return Err(ProvisionError::Inspect {
                    resource: resource.id.clone(),
                    message: "boom".to_string(),
                });
            }
            if let ResourceSpec::Container(spec) = &resource.spec {
                for env in &spec.envs {
                    let value = env.resolve(outputs)?;
                    self.seen_envs.lock().unwrap().push(value);
                }
            }
            Ok([Attribute::Id, Attribute::Hostname, Attribute::Sha256Digest, Attribute::Name]
                .into_iter()
                .map(|attr| (attr, format!("{}-{}", attr.as_str(), resource.name())))
                .collect())
        }

        async fn destroy(
            &self,
            _ctx: &ApplyContext,
            resource: &Resource,
            _outputs: &ResolvedOutputs,
        ) -> Result<(), ProvisionError> {
            self.calls.lock().unwrap().push(format!("down {}", resource.name()));
            Ok(())
        }
    }

    fn sample_stack() -> Stack {
        let mut stack = Stack::new("test");
        let net = stack
            .declare("proxy", NetworkSpec::default(), ResourceOptions::new())
            .unwrap();
        let image = stack
            .declare("postgres", RegistryImageSpec::new("postgres:14"), ResourceOptions::new())
            .unwrap();
        let data = stack
            .declare("db-data", VolumeSpec::default(), ResourceOptions::new())
            .unwrap();
        let db = stack
            .declare(
                "db",
                ContainerSpec::new(image.sha256_digest())
                    .hostname("db")
                    .network(net.output_id())
                    .volume(data.name(), "/var/lib/postgresql/data"),
                ResourceOptions::new().depends_on([&net, &image, &data]),
            )
            .unwrap();
        stack
            .declare(
                "app",
                ContainerSpec::new(Output::literal("app:latest"))
                    .env(interpolate!("DATABASE_URL=postgres://{}:5432/app", db.hostname())),
                ResourceOptions::new().depends_on([&db]),
            )
            .unwrap();
        stack
    }

    #[tokio::test]
    async fn test_apply_resolves_outputs_of_earlier_waves() {
        let stack = sample_stack();
        let plan = Plan::build(&stack).unwrap();
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        let envs = recorder.seen_envs.clone();
        let applier = Applier::new().with_provisioner(recorder);

        let report = applier.apply(&ApplyContext::new("test"), &stack, &plan).await;

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.count(StepStatus::Success), 5);
        assert_eq!(
            *envs.lock().unwrap(),
            vec!["DATABASE_URL=postgres://hostname-db:5432/app".to_string()]
        );
        let calls = calls.lock().unwrap();
        assert_eq!(calls.last().map(String::as_str), Some("up app"));
        assert_eq!(calls[3], "up db");
    }

    #[tokio::test]
    async fn test_failure_skips_later_waves() {
        let stack = sample_stack();
        let plan = Plan::build(&stack).unwrap();
        let recorder = Recorder {
            fail_on: Some("db-data"),
            ..Recorder::default()
        };
        let calls = recorder.calls.clone();
        let applier = Applier::new().with_provisioner(recorder);

        let report = applier.apply(&ApplyContext::new("test"), &stack, &plan).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.count(StepStatus::Failed), 1);
        // the rest of the failing wave still ran
        assert_eq!(report.count(StepStatus::Success), 2);
        assert_eq!(report.count(StepStatus::Skipped), 2);
        assert!(!calls.lock().unwrap().iter().any(|c| c == "up db"));

        let failed: Vec<&str> = report.failed_steps().map(|s| s.resource.name()).collect();
        assert_eq!(failed, vec!["db-data"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let stack = sample_stack();
        let plan = Plan::build(&stack).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ApplyContext::new("test").with_cancel_token(token);

        let report = Applier::new()
            .with_provisioner(Recorder::default())
            .apply(&ctx, &stack, &plan)
            .await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.count(StepStatus::Skipped), 5);
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_provisioner_fails_step() {
        let stack = sample_stack();
        let plan = Plan::build(&stack).unwrap();

        let report = Applier::new().apply(&ApplyContext::new("test"), &stack, &plan).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.count(StepStatus::Failed), 3);
    }

    #[tokio::test]
    async fn test_destroy_runs_dependents_first() {
        let stack = sample_stack();
        let plan = Plan::build(&stack).unwrap();
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();

        let report = Applier::new()
            .with_provisioner(recorder)
            .destroy(&ApplyContext::new("test"), &stack, &plan)
            .await;

        assert_eq!(report.status, RunStatus::Success);
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], "down app");
        assert_eq!(calls[1], "down db");
        assert_eq!(calls.len(), 5);
    }

    #[test]
    fn test_known_outputs_use_metadata_names() {
        let mut stack = Stack::new("test");
        stack
            .declare(
                "registry",
                NamespaceSpec {
                    metadata: ObjectMeta::default().named("registry-ns"),
                },
                ResourceOptions::new(),
            )
            .unwrap();
        stack
            .declare(
                "coder",
                ContainerSpec::new(Output::literal("coder")),
                ResourceOptions::new(),
            )
            .unwrap();

        let outputs = known_outputs(&stack);
        let ns = ResourceId::new(ResourceKind::Namespace, "registry");
        let coder = ResourceId::new(ResourceKind::Container, "coder");
        assert_eq!(outputs.get(&ns, Attribute::Id), Some("registry-ns"));
        assert_eq!(outputs.get(&coder, Attribute::Hostname), Some("coder"));
        assert_eq!(outputs.get(&coder, Attribute::Sha256Digest), None);
    }
}
