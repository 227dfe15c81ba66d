//! RSS-Bridge on kubernetes, image built locally and never pulled

use std::collections::BTreeMap;
use std::fs;

use crate::domain::kube::{
    ConfigMapSpec, DeploymentSpec, KubeContainer, KubeVolume, KubeVolumeMount, NamespaceSpec,
    ObjectMeta, ServicePort, ServiceSpec,
};
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::services::args::KubeServiceArgs;
use crate::services::docker::local_image;
use crate::services::kube::{http_scaled_object, interceptor_route};
use crate::services::{Service, KUBE_SERVICE};
use crate::state::{Component, Stack};

const APP: &str = "rss-bridge";
const PORT: u16 = 80;
const WHITELIST: &str = "whitelist.txt";

pub struct RssBridgeKube {
    pub args: KubeServiceArgs,
}

impl Service for RssBridgeKube {
    fn name(&self) -> &str {
        "rss_bridge_kube"
    }

    fn component_type(&self) -> &'static str {
        KUBE_SERVICE
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        self.args.require_network(name)?;
        let platform = self.args.require_platform(name)?;
        let provider = self.args.require_provider(name)?;
        let domain = self.args.require_domain(name)?;

        let whitelist_path = self.args.asset("rss_bridge/whitelist.txt");
        let whitelist = fs::read_to_string(&whitelist_path).map_err(|source| DeclareError::Asset {
            path: whitelist_path.clone(),
            source,
        })?;

        let mut scope = stack.component(KUBE_SERVICE, name)?;
        let opts = || ResourceOptions::new().provider(provider);

        let image = local_image(
            &mut scope,
            "rss-bridge",
            "rss-bridge",
            &self.args.asset("rss_bridge/source"),
            platform,
        )?;

        let namespace = scope.declare("rss-bridge", NamespaceSpec::default(), opts())?;

        let config = scope.declare(
            "rss-bridge",
            ConfigMapSpec {
                metadata: ObjectMeta::in_namespace(namespace.output_id()).named("rss-bridge-config"),
                data: BTreeMap::from([(WHITELIST.to_string(), whitelist)]),
            },
            opts().depends_on([&namespace]),
        )?;

        let mut container = KubeContainer::new("rss-bridge", image.image_name());
        container.image_pull_policy = Some("Never".to_string());
        container.volume_mounts.push(KubeVolumeMount {
            name: "rss-bridge".to_string(),
            mount_path: format!("/app/{}", WHITELIST),
            sub_path: Some(WHITELIST.to_string()),
        });
        let deployment = scope.declare(
            "rss-bridge",
            DeploymentSpec {
                metadata: ObjectMeta::in_namespace(namespace.output_id()),
                replicas: 1,
                app_label: APP.to_string(),
                containers: vec![container],
                volumes: vec![KubeVolume {
                    name: "rss-bridge".to_string(),
                    config_map: config.metadata_name(),
                }],
            },
            opts().depends_on([&namespace, &image, &config]),
        )?;

        let service = scope.declare(
            "rss-bridge",
            ServiceSpec {
                metadata: ObjectMeta::in_namespace(namespace.output_id()).label("app", APP),
                service_type: "ClusterIP".to_string(),
                ports: vec![ServicePort::tcp(PORT, PORT)],
                selector: [("app".to_string(), APP.to_string())].into(),
            },
            opts().depends_on([&namespace, &deployment]),
        )?;

        scope.declare(
            "nginx-autoscale",
            http_scaled_object(
                "rss-bridge",
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
            "nginx-proxy",
            interceptor_route("rss-bridge-proxy", domain),
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
    use crate::services::testing::{kube_fixture, WHITELIST as WHITELIST_CONTENT};

    #[test]
    fn test_whitelist_mounted_from_config_map() {
        let (mut stack, args, _assets) = kube_fixture("rss.example.org");
        RssBridgeKube { args }.declare(&mut stack).unwrap();

        let config_id = ResourceId::new(ResourceKind::ConfigMap, "rss-bridge");
        let ResourceSpec::ConfigMap(config) = &stack.get(&config_id).unwrap().spec else {
            panic!("rss-bridge is not a config map");
        };
        assert_eq!(config.data[WHITELIST], WHITELIST_CONTENT);

        let deployment_id = ResourceId::new(ResourceKind::Deployment, "rss-bridge");
        let deployment = stack.get(&deployment_id).unwrap();
        assert!(deployment.depends_on.contains(&config_id));
        let ResourceSpec::Deployment(spec) = &deployment.spec else {
            panic!("rss-bridge is not a deployment");
        };
        let manifest = spec.manifest("rss-bridge", &preview_resolver).unwrap();
        let pod = &manifest["spec"]["template"]["spec"];
        assert_eq!(pod["containers"][0]["imagePullPolicy"], "Never");
        assert_eq!(pod["containers"][0]["volumeMounts"][0]["subPath"], "whitelist.txt");
        assert_eq!(pod["volumes"][0]["configMap"]["name"], "${rss-bridge.metadata_name}");
    }
}
