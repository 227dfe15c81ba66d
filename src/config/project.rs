//! Stack 配置
//!
//! 把 `ConfigStore` 中的通用键整理成服务声明所需的输入。

use std::path::PathBuf;

use crate::config::env::constants::{
    DEFAULT_ASSETS_DIR, DEFAULT_NETWORK, DEFAULT_SFTP_BASE_PATH, DEFAULT_SFTP_PORT,
    DEFAULT_STACK_NAME, DEFAULT_TIMEZONE,
};
use crate::config::store::ConfigStore;
use crate::domain::kube::KubeProvider;
use crate::domain::resource::ResourceRef;
use crate::error::ConfigError;
use crate::services::args::{DockerServiceArgs, KubeServiceArgs, SftpDriverOpts};

/// Stack 配置
#[derive(Clone, Debug)]
pub struct StackConfig {
    pub stack_name: String,
    /// 共享网络名称
    pub network: String,
    /// 镜像目标平台（`docker.platform`）
    pub platform: Option<String>,
    /// SFTP 连接信息；未配置 `sftp.host` 时为 None
    pub sftp: Option<SftpDriverOpts>,
    pub sftp_base_path: String,
    pub timezone: String,
    pub assets_dir: PathBuf,
    pub kube_provider: KubeProvider,
    /// 启用的服务（`services.enabled`）
    pub enabled: Vec<String>,
    /// 原始配置，服务从中读取各自的键
    pub store: ConfigStore,
}

impl StackConfig {
    pub fn from_store(store: ConfigStore) -> Result<Self, ConfigError> {
        let sftp = match store.get("sftp.host") {
            Some(host) => {
                let port = store
                    .get_parsed::<u16>("sftp.port")?
                    .unwrap_or(DEFAULT_SFTP_PORT);
                Some(SftpDriverOpts::new(
                    host,
                    port,
                    store.require("sftp.user")?,
                    store.require_secret("sftp.password")?,
                ))
            }
            None => None,
        };

        let kube_provider = KubeProvider {
            name: store.get_or("kubernetes.provider", "k8s"),
            context: store.get("kubernetes.context"),
            kubeconfig: store.get("kubernetes.kubeconfig").map(PathBuf::from),
        };

        Ok(Self {
            stack_name: store.get_or("stack.name", DEFAULT_STACK_NAME),
            network: store.get_or("stack.network", DEFAULT_NETWORK),
            platform: store.get("docker.platform"),
            sftp,
            sftp_base_path: store.get_or("sftp.base_path", DEFAULT_SFTP_BASE_PATH),
            timezone: store.get_or("docker.timezone", DEFAULT_TIMEZONE),
            assets_dir: PathBuf::from(store.get_or("docker.assets_dir", DEFAULT_ASSETS_DIR)),
            kube_provider,
            enabled: store.get_list("services.enabled"),
            store,
        })
    }

    /// 某个 docker 服务的输入；`<service>.hostname` 覆盖主容器 hostname
    pub fn docker_args(&self, service: &str, network: &ResourceRef) -> DockerServiceArgs {
        DockerServiceArgs {
            network: Some(network.clone()),
            platform: self.platform.clone(),
            driver_opts: self.sftp.clone(),
            sftp_base_path: Some(self.sftp_base_path.clone()),
            hostname: self.store.get(&format!("{}.hostname", service)),
            timezone: self.timezone.clone(),
            assets_dir: self.assets_dir.clone(),
        }
    }

    /// 某个 kubernetes 服务的输入；域名取自 `<section>.domain`
    pub fn kube_args(&self, section: &str, network: &ResourceRef) -> KubeServiceArgs {
        KubeServiceArgs {
            network: Some(network.clone()),
            platform: self.platform.clone(),
            provider: Some(self.kube_provider.clone()),
            domain: self.store.get(&format!("{}.domain", section)),
            assets_dir: self.assets_dir.clone(),
        }
    }

    pub fn is_enabled(&self, service: &str) -> bool {
        self.enabled.iter().any(|s| s == service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::docker::NetworkSpec;
    use crate::domain::resource::ResourceOptions;
    use crate::state::Stack;

    const CONFIG: &str = r#"
[stack]
name = "home"

[docker]
platform = "linux/arm64"

[sftp]
host = "nas.lan"
user = "homelab"
password = "hunter2"
base_path = "/srv"

[grafana]
hostname = "metrics"

[registry]
domain = "registry.example.org"

[kubernetes]
context = "k3s"

[services]
enabled = ["grafana", "registry"]
"#;

    fn config() -> StackConfig {
        StackConfig::from_store(ConfigStore::from_toml_str(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_and_values() {
        let cfg = config();
        assert_eq!(cfg.stack_name, "home");
        assert_eq!(cfg.network, "proxy");
        assert_eq!(cfg.timezone, "Europe/Paris");
        assert_eq!(cfg.sftp_base_path, "/srv");
        assert_eq!(cfg.kube_provider.context.as_deref(), Some("k3s"));
        assert!(cfg.is_enabled("registry"));
        assert!(!cfg.is_enabled("coder"));

        let sftp = cfg.sftp.unwrap();
        assert_eq!(sftp.port.render(false), "22");
        assert!(sftp.password.is_secret());
    }

    #[test]
    fn test_missing_sftp_user_is_an_error() {
        let store = ConfigStore::from_toml_str("[sftp]\nhost = \"nas\"\npassword = \"x\"").unwrap();
        assert!(matches!(
            StackConfig::from_store(store),
            Err(ConfigError::Missing(key)) if key == "sftp.user"
        ));
    }

    #[test]
    fn test_service_args() {
        let cfg = config();
        let mut stack = Stack::new("home");
        let proxy = stack
            .declare("proxy", NetworkSpec::default(), ResourceOptions::new())
            .unwrap();

        let docker = cfg.docker_args("grafana", &proxy);
        assert_eq!(docker.hostname.as_deref(), Some("metrics"));
        assert_eq!(docker.platform.as_deref(), Some("linux/arm64"));
        assert!(docker.require_storage("grafana").is_ok());

        let kube = cfg.kube_args("registry", &proxy);
        assert_eq!(kube.domain.as_deref(), Some("registry.example.org"));
        assert!(kube.require_provider("registry").is_ok());
    }
}
