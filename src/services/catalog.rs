//! Service catalog
//!
//! Maps the names listed in `services.enabled` to service declarations and
//! builds the whole stack: the shared proxy network first, then every enabled
//! service in list order.

use tracing::{debug, info};

use crate::config::{ConfigStore, StackConfig};
use crate::domain::docker::NetworkSpec;
use crate::domain::resource::{ResourceOptions, ResourceRef};
use crate::error::DeclareError;
use crate::services::args::{DockerServiceArgs, KubeServiceArgs};
use crate::services::docker::{
    Caddy, Coder, Concourse, Filestash, Forgejo, Grafana, Homepage, Ipfs, Kellnr, Ollama, Polr,
    RssBridge, RssForwarder, RssMiniflux, Seedbox, Shaarli, Syncthing, Tailscale, Umami,
};
use crate::services::kube::{Registry, RssBridgeKube};
use crate::services::Service;
use crate::state::Stack;

/// Services backed by the docker provider
pub const DOCKER_SERVICES: &[&str] = &[
    "caddy",
    "coder",
    "concourse",
    "filestash",
    "forgejo",
    "grafana",
    "homepage",
    "ipfs",
    "kellnr",
    "ollama",
    "polr",
    "rss_bridge",
    "rss_forwarder",
    "rss_miniflux",
    "seedbox",
    "shaarli",
    "syncthing",
    "tailscale",
    "umami",
];

/// Services backed by the kubernetes provider
pub const KUBE_SERVICES: &[&str] = &["registry", "rss_bridge_kube"];

pub fn service_names() -> impl Iterator<Item = &'static str> {
    DOCKER_SERVICES.iter().chain(KUBE_SERVICES).copied()
}

/// Config section a kubernetes service reads its domain from
fn kube_section(name: &str) -> &str {
    match name {
        "rss_bridge_kube" => "rss_bridge",
        other => other,
    }
}

/// Builds the named service from the stack configuration
pub fn build(
    name: &str,
    config: &StackConfig,
    network: &ResourceRef,
) -> Result<Box<dyn Service>, DeclareError> {
    if KUBE_SERVICES.contains(&name) {
        let args = config.kube_args(kube_section(name), network);
        kube_service(name, args)
    } else {
        let args = config.docker_args(name, network);
        docker_service(name, args, &config.store)
    }
}

/// Builds a docker service from explicit args
pub fn docker_service(
    name: &str,
    args: DockerServiceArgs,
    store: &ConfigStore,
) -> Result<Box<dyn Service>, DeclareError> {
    let service: Box<dyn Service> = match name {
        "caddy" => Box::new(Caddy { args }),
        "coder" => Box::new(Coder::from_config(args, store)?),
        "concourse" => Box::new(Concourse::from_config(args, store)?),
        "filestash" => Box::new(Filestash::from_config(args, store)?),
        "forgejo" => Box::new(Forgejo { args }),
        "grafana" => Box::new(Grafana::from_config(args, store)?),
        "homepage" => Box::new(Homepage { args }),
        "ipfs" => Box::new(Ipfs { args }),
        "kellnr" => Box::new(Kellnr::from_config(args, store)?),
        "ollama" => Box::new(Ollama { args }),
        "polr" => Box::new(Polr::from_config(args, store)?),
        "rss_bridge" => Box::new(RssBridge { args }),
        "rss_forwarder" => Box::new(RssForwarder { args }),
        "rss_miniflux" => Box::new(RssMiniflux::from_config(args, store)?),
        "seedbox" => Box::new(Seedbox { args }),
        "shaarli" => Box::new(Shaarli { args }),
        "syncthing" => Box::new(Syncthing { args }),
        "tailscale" => Box::new(Tailscale::from_config(args, store)?),
        "umami" => Box::new(Umami::from_config(args, store)?),
        other => return Err(DeclareError::UnknownService(other.to_string())),
    };
    Ok(service)
}

/// Builds a kubernetes service from explicit args
pub fn kube_service(name: &str, args: KubeServiceArgs) -> Result<Box<dyn Service>, DeclareError> {
    match name {
        "registry" => Ok(Box::new(Registry { args })),
        "rss_bridge_kube" => Ok(Box::new(RssBridgeKube { args })),
        other => Err(DeclareError::UnknownService(other.to_string())),
    }
}

/// Declares the shared network and every enabled service
pub fn declare_stack(config: &StackConfig) -> Result<Stack, DeclareError> {
    let mut stack = Stack::new(&config.stack_name);
    let proxy = stack.declare(&config.network, NetworkSpec::default(), ResourceOptions::new())?;

    for name in &config.enabled {
        let service = build(name, config, &proxy)?;
        let component = service.declare(&mut stack)?;
        debug!(
            service = %name,
            component_type = service.component_type(),
            resources = component.resources.len(),
            "Service declared"
        );
    }

    info!(
        stack = %config.stack_name,
        services = config.enabled.len(),
        resources = stack.len(),
        "Stack declared"
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{ResourceId, ResourceKind};
    use crate::services::plan::{check_dependencies, Plan};
    use crate::services::testing::{assets_dir, docker_fixture, kube_fixture};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    const FULL_CONFIG: &str = r#"
[stack]
name = "home"

[docker]
platform = "linux/amd64"

[sftp]
host = "nas.lan"
user = "homelab"
password = "hunter2"
base_path = "/srv/homelab"

[coder]
docker_group_id = "998"
postgres_password = "coder-pw"
access_url = "https://coder.example.org"
wildcard_url = "*.coder.example.org"

[concourse]
postgres_password = "concourse-pw"
add_local_user = "admin:admin"
main_team_local_user = "admin"

[filestash]
config_secret = "filestash-secret"

[polr]
mysql_password = "polr-pw"
app_address = "s.example.org"
admin_username = "admin"
admin_password = "polr-admin"

[rss_miniflux]
postgres_password = "miniflux-pw"

[tailscale]
auth_key = "tskey-auth"

[umami]
postgres_password = "umami-pw"
app_secret = "umami-secret"

[registry]
domain = "registry.example.org"

[rss_bridge]
domain = "rss.example.org"
"#;

    fn full_config(enabled: &[&str]) -> (StackConfig, TempDir) {
        let assets = assets_dir();
        let mut store = ConfigStore::from_toml_str(FULL_CONFIG).unwrap();
        store.set("docker.assets_dir", assets.path().display().to_string());
        store.set("services.enabled", enabled.join(","));
        (StackConfig::from_store(store).unwrap(), assets)
    }

    /// Required inputs each docker service validates, in check order
    fn required_fields(name: &str) -> &'static [&'static str] {
        match name {
            "rss_bridge" => &["network", "platform"],
            "tailscale" => &["network", "sftp_base_path", "platform"],
            _ => &["network", "driver_opts", "sftp_base_path", "platform"],
        }
    }

    fn without(mut args: DockerServiceArgs, field: &str) -> DockerServiceArgs {
        match field {
            "network" => args.network = None,
            "driver_opts" => args.driver_opts = None,
            "sftp_base_path" => args.sftp_base_path = None,
            "platform" => args.platform = None,
            _ => unreachable!(),
        }
        args
    }

    #[test]
    fn test_docker_services_fail_fast_on_missing_input() {
        let (config, _assets) = full_config(&[]);
        for name in DOCKER_SERVICES {
            for field in ["network", "driver_opts", "sftp_base_path", "platform"] {
                let (mut stack, args, _assets) = docker_fixture();
                let service = docker_service(name, without(args, field), &config.store).unwrap();
                let result = service.declare(&mut stack);

                if required_fields(name).contains(&field) {
                    match result {
                        Err(DeclareError::MissingInput { field: f, component }) => {
                            assert_eq!(f, field, "{}", name);
                            assert_eq!(component, *name);
                        }
                        other => panic!("{} without {}: {:?}", name, field, other.map(|c| c.name)),
                    }
                    assert_eq!(stack.len(), 1, "{} left resources behind", name);
                    assert!(stack.components().is_empty());
                } else {
                    assert!(result.is_ok(), "{} does not need {}", name, field);
                }
            }
        }
    }

    #[test]
    fn test_kube_services_fail_fast_on_missing_input() {
        for name in KUBE_SERVICES {
            for field in ["network", "platform", "provider", "domain"] {
                let (mut stack, mut args, _assets) = kube_fixture("example.org");
                match field {
                    "network" => args.network = None,
                    "platform" => args.platform = None,
                    "provider" => args.provider = None,
                    _ => args.domain = None,
                }
                let err = kube_service(name, args).unwrap().declare(&mut stack).unwrap_err();
                assert!(
                    matches!(err, DeclareError::MissingInput { field: f, .. } if f == field),
                    "{} without {}",
                    name,
                    field
                );
                assert_eq!(stack.len(), 1);
            }
        }
    }

    #[test]
    fn test_missing_service_secret_is_config_error() {
        let (_, args, _assets) = docker_fixture();
        let err = docker_service("umami", args, &ConfigStore::default()).err().unwrap();
        assert!(matches!(
            err,
            DeclareError::Config(crate::error::ConfigError::Missing(key)) if key == "umami.postgres_password"
        ));
    }

    #[test]
    fn test_unknown_service() {
        let (config, _assets) = full_config(&["nextcloud"]);
        assert!(matches!(
            declare_stack(&config),
            Err(DeclareError::UnknownService(name)) if name == "nextcloud"
        ));
    }

    #[test]
    fn test_every_service_declares_its_dependencies() {
        // rss_bridge and rss_bridge_kube share resource names
        let all: Vec<&str> = service_names().filter(|n| *n != "rss_bridge").collect();
        let (config, _assets) = full_config(&all);
        let stack = declare_stack(&config).unwrap();

        assert_eq!(stack.components().len(), all.len());
        let issues = check_dependencies(&stack);
        assert!(issues.is_empty(), "{:?}", issues);
        assert!(Plan::build(&stack).is_ok());

        let (config, _assets) = full_config(&["rss_bridge"]);
        let stack = declare_stack(&config).unwrap();
        assert!(check_dependencies(&stack).is_empty());
    }

    #[test]
    fn test_bundles_hold_exactly_their_resources() {
        let all: Vec<&str> = service_names().filter(|n| *n != "rss_bridge_kube").collect();
        let (config, _assets) = full_config(&all);
        let stack = declare_stack(&config).unwrap();

        for component in stack.components() {
            let declared: BTreeSet<&ResourceId> = stack
                .resources()
                .iter()
                .filter(|r| r.parent.as_deref() == Some(component.key().as_str()))
                .map(|r| &r.id)
                .collect();
            let bundled: BTreeSet<&ResourceId> = component.resources.iter().collect();
            assert_eq!(declared, bundled, "{}", component.name);
            assert_eq!(bundled.len(), component.resources.len());
        }

        let top_level: Vec<&str> = stack
            .resources()
            .iter()
            .filter(|r| r.parent.is_none())
            .map(|r| r.name())
            .collect();
        assert_eq!(top_level, vec!["proxy"]);
    }

    #[test]
    fn test_docker_bundles_follow_declaration_order() {
        // images, then volumes, then internal networks, then containers
        let rank = |kind: ResourceKind| -> u8 {
            match kind {
                ResourceKind::RegistryImage | ResourceKind::Image => 0,
                ResourceKind::Volume => 1,
                ResourceKind::Network => 2,
                _ => 3,
            }
        };
        let (config, _assets) = full_config(DOCKER_SERVICES);
        let stack = declare_stack(&config).unwrap();

        for component in stack.components() {
            let ranks: Vec<u8> = component.resources.iter().map(|id| rank(id.kind())).collect();
            let mut sorted = ranks.clone();
            sorted.sort();
            assert_eq!(ranks, sorted, "{} declares {:?}", component.name, component.resources);
        }
    }

    #[test]
    fn test_names_stable_across_declarations() {
        let all: Vec<&str> = DOCKER_SERVICES.to_vec();
        let (config, _assets) = full_config(&all);
        let first = declare_stack(&config).unwrap();
        let second = declare_stack(&config).unwrap();

        let urns = |stack: &Stack| -> Vec<String> {
            stack.resources().iter().map(|r| r.urn.clone()).collect()
        };
        assert_eq!(urns(&first), urns(&second));
        assert!(urns(&first).contains(&"urn:homelab:home::docker_service$docker:index:Container::coder".to_string()));
    }

    #[test]
    fn test_both_rss_bridge_flavours_collide() {
        let (config, _assets) = full_config(&["rss_bridge", "rss_bridge_kube"]);
        assert!(matches!(
            declare_stack(&config),
            Err(DeclareError::DuplicateResource(_))
        ));
    }
}
