//! Kubernetes service catalog
//!
//! Services scaled to zero by the KEDA HTTP add-on and exposed through a
//! Traefik route to the interceptor proxy.

pub mod registry;
pub mod rss_bridge;

pub use registry::Registry;
pub use rss_bridge::RssBridgeKube;

use crate::domain::kube::{CustomResourceSpec, Field, ObjectMeta};
use crate::domain::output::Output;

/// Namespace the KEDA HTTP add-on runs in
pub(crate) const KEDA_NAMESPACE: &str = "keda";
const INTERCEPTOR_SERVICE: &str = "keda-add-ons-http-interceptor-proxy";
const INTERCEPTOR_PORT: i64 = 8080;

/// `HTTPScaledObject` routing `host` to `service:port` of `deployment`
pub(crate) fn http_scaled_object(
    name: &str,
    namespace: Output,
    host: &str,
    deployment: Output,
    service: Output,
    port: i64,
    max_replicas: i64,
) -> CustomResourceSpec {
    CustomResourceSpec {
        api_version: "http.keda.sh/v1alpha1".to_string(),
        kind: "HTTPScaledObject".to_string(),
        metadata: ObjectMeta::in_namespace(namespace).named(name),
        spec: Field::map([
            ("hosts", Field::list([Field::from(host)])),
            (
                "scaleTargetRef",
                Field::map([
                    ("name", Field::from(deployment)),
                    ("kind", Field::from("Deployment")),
                    ("service", Field::from(service)),
                    ("port", Field::Int(port)),
                ]),
            ),
            (
                "replicas",
                Field::map([("min", Field::Int(0)), ("max", Field::Int(max_replicas))]),
            ),
        ]),
    }
}

/// Traefik `IngressRoute` sending `host` to the KEDA interceptor
pub(crate) fn interceptor_route(name: &str, host: &str) -> CustomResourceSpec {
    let rule = format!("Host(`{}`)", host);
    CustomResourceSpec {
        api_version: "traefik.io/v1alpha1".to_string(),
        kind: "IngressRoute".to_string(),
        metadata: ObjectMeta::in_namespace(KEDA_NAMESPACE).named(name),
        spec: Field::map([
            (
                "entryPoints",
                Field::list([Field::from("web"), Field::from("websecure")]),
            ),
            (
                "routes",
                Field::list([Field::map([
                    ("match", Field::from(rule.as_str())),
                    ("kind", Field::from("Rule")),
                    (
                        "services",
                        Field::list([Field::map([
                            ("name", Field::from(INTERCEPTOR_SERVICE)),
                            ("port", Field::Int(INTERCEPTOR_PORT)),
                        ])]),
                    ),
                ])]),
            ),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kube::preview_resolver;

    #[test]
    fn test_interceptor_route_targets_keda() {
        let manifest = interceptor_route("registry-proxy", "registry.example.org")
            .manifest("registry-proxy", &preview_resolver)
            .unwrap();

        assert_eq!(manifest["metadata"]["namespace"], "keda");
        assert_eq!(manifest["spec"]["entryPoints"][1], "websecure");
        let route = &manifest["spec"]["routes"][0];
        assert_eq!(route["match"], "Host(`registry.example.org`)");
        assert_eq!(route["services"][0]["name"], "keda-add-ons-http-interceptor-proxy");
        assert_eq!(route["services"][0]["port"], 8080);
    }
}
