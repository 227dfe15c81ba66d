//! Docker distribution registry on kubernetes, scaled from zero on demand

use crate::domain::kube::{
    DeploymentSpec, KubeContainer, NamespaceSpec, ObjectMeta, ServicePort, ServiceSpec,
};
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::KubeServiceArgs;
use crate::services::kube::{http_scaled_object, interceptor_route};
use crate::services::{Service, KUBE_SERVICE};
use crate::state::{Component, Stack};

const APP: &str = "registry";
const PORT: u16 = 5000;

pub struct Registry {
    pub args: KubeServiceArgs,
}

impl Service for Registry {
    fn name(&self) -> &str {
        "registry"
    }

    fn component_type(&self) -> &'static str {
        KUBE_SERVICE
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        self.args.require_network(name)?;
        self.args.require_platform(name)?;
        let provider = self.args.require_provider(name)?;
        let domain = self.args.require_domain(name)?;

        let mut scope = stack.component(KUBE_SERVICE, name)?;
        let opts = || ResourceOptions::new().provider(provider);

        let namespace = scope.declare("registry", NamespaceSpec::default(), opts())?;

        let mut container = KubeContainer::new("registry", "registry:2");
        container
            .env
            .push(("REGISTRY_HTTP_ADDR".to_string(), format!("0.0.0.0:{}", PORT)));
        let deployment = scope.declare(
            "registry",
            DeploymentSpec {
                metadata: ObjectMeta::in_namespace(namespace.output_id()),
                replicas: 1,
                app_label: APP.to_string(),
                containers: vec![container],
                volumes: Vec::new(),
            },
            opts().depends_on([&namespace]),
        )?;

        let service = scope.declare(
            "registry",
            ServiceSpec {
                metadata: ObjectMeta::in_namespace(namespace.output_id()).label("app", APP),
                service_type: "ClusterIP".to_string(),
                ports: vec![ServicePort::tcp(PORT, PORT)],
                selector: [("app".to_string(), APP.to_string())].into(),
            },
            opts().depends_on([&namespace, &deployment]),
        )?;

        scope.declare(
            "registry-autoscale",
            http_scaled_object(
                "registry",
                namespace.output_id(),
                domain,
                deployment.metadata_name(),
                service.metadata_name(),
                i64::from(PORT),
                2,
            ),
            opts().depends_on([&namespace, &deployment, &service]),
        )?;

        scope.declare(
            "registry-proxy",
            interceptor_route("registry-proxy", domain),
            opts(),
        )?;

        scope.export("domain", domain);
        Ok(scope.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kube::preview_resolver;
    use crate::domain::resource::{ResourceId, ResourceKind, ResourceSpec};
    use crate::services::testing::kube_fixture;

    #[test]
    fn test_registry_resources_and_scaler() {
        let (mut stack, args, _assets) = kube_fixture("registry.example.org");
        let component = Registry { args }.declare(&mut stack).unwrap();

        assert_eq!(component.component_type, KUBE_SERVICE);
        assert_eq!(component.resources.len(), 5);
        assert!(stack
            .children(&component)
            .all(|r| r.provider.as_ref().map(|p| p.name.as_str()) == Some("k8s")));

        let id = ResourceId::new(ResourceKind::CustomResource, "registry-autoscale");
        let ResourceSpec::CustomResource(spec) = &stack.get(&id).unwrap().spec else {
            panic!("registry-autoscale is not a custom resource");
        };
        let manifest = spec.manifest("registry-autoscale", &preview_resolver).unwrap();
        assert_eq!(manifest["spec"]["hosts"][0], "registry.example.org");
        assert_eq!(manifest["spec"]["scaleTargetRef"]["name"], "${registry.metadata_name}");
        assert_eq!(manifest["spec"]["replicas"]["max"], 2);
    }

    #[test]
    fn test_missing_domain_fails_fast() {
        let (mut stack, mut args, _assets) = kube_fixture("registry.example.org");
        args.domain = None;
        let err = Registry { args }.declare(&mut stack).unwrap_err();
        assert!(matches!(err, DeclareError::MissingInput { field: "domain", .. }));
        assert_eq!(stack.len(), 1);
    }
}
