//! Shared inputs for service declarations
//!
//! Every docker service takes the same [`DockerServiceArgs`]; the kubernetes
//! variants take [`KubeServiceArgs`]. Required inputs are checked with the
//! `require_*` helpers before anything is declared.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::env::constants::{DEFAULT_ASSETS_DIR, DEFAULT_TIMEZONE};
use crate::domain::docker::{VolumeSpec, RCLONE_DRIVER};
use crate::domain::kube::KubeProvider;
use crate::domain::output::Output;
use crate::domain::resource::{ResourceOptions, ResourceRef};
use crate::error::DeclareError;
use crate::interpolate;
use crate::state::ComponentScope;

/// Remote filesystem reached by the rclone volume driver
#[derive(Clone, Debug)]
pub struct SftpDriverOpts {
    pub host: Output,
    pub port: Output,
    pub user: Output,
    pub password: Output,
}

impl SftpDriverOpts {
    pub fn new(
        host: impl Into<Output>,
        port: u16,
        user: impl Into<Output>,
        password: Output,
    ) -> Self {
        Self {
            host: host.into(),
            port: Output::literal(port.to_string()),
            user: user.into(),
            password: password.into_secret(),
        }
    }
}

/// Inputs shared by every docker service
#[derive(Clone, Debug, Default)]
pub struct DockerServiceArgs {
    /// Shared network the public-facing containers join
    pub network: Option<ResourceRef>,
    /// Target platform for images, e.g. `linux/arm64`
    pub platform: Option<String>,
    pub driver_opts: Option<SftpDriverOpts>,
    /// Root directory on the remote filesystem for all volumes
    pub sftp_base_path: Option<String>,
    /// Overrides the primary container's hostname
    pub hostname: Option<String>,
    pub timezone: String,
    pub assets_dir: PathBuf,
}

impl DockerServiceArgs {
    pub fn new(network: &ResourceRef) -> Self {
        Self {
            network: Some(network.clone()),
            platform: None,
            driver_opts: None,
            sftp_base_path: Some("/".to_string()),
            hostname: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
        }
    }

    pub fn require_network(&self, component: &str) -> Result<&ResourceRef, DeclareError> {
        self.network
            .as_ref()
            .ok_or_else(|| DeclareError::missing("network", component))
    }

    pub fn require_platform(&self, component: &str) -> Result<&str, DeclareError> {
        self.platform
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| DeclareError::missing("platform", component))
    }

    /// Driver options plus base path, both needed by any sftp volume
    pub fn require_storage(&self, component: &str) -> Result<SftpStorage<'_>, DeclareError> {
        let opts = self
            .driver_opts
            .as_ref()
            .ok_or_else(|| DeclareError::missing("driver_opts", component))?;
        let base_path = self.require_base_path(component)?;
        Ok(SftpStorage { opts, base_path })
    }

    pub fn require_base_path(&self, component: &str) -> Result<&str, DeclareError> {
        self.sftp_base_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| DeclareError::missing("sftp_base_path", component))
    }

    /// Hostname of the primary container
    pub fn hostname_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.hostname.as_deref().unwrap_or(default)
    }

    /// Path under the assets directory
    pub fn asset(&self, rel: &str) -> PathBuf {
        self.assets_dir.join(rel)
    }
}

/// Validated storage inputs
#[derive(Clone, Copy, Debug)]
pub struct SftpStorage<'a> {
    pub opts: &'a SftpDriverOpts,
    pub base_path: &'a str,
}

impl SftpStorage<'_> {
    /// Remote directory for a volume: `<base>/<rel>` with a single separator
    pub fn path(&self, rel: &str) -> String {
        let base = self.base_path.trim_end_matches('/');
        let rel = rel.trim_start_matches('/');
        format!("{}/{}", base, rel)
    }

    pub fn volume_spec(&self, rel: &str) -> VolumeSpec {
        let opts = self.opts;
        let driver_opts = BTreeMap::from([
            ("type".to_string(), Output::literal("sftp")),
            ("sftp-host".to_string(), opts.host.clone()),
            ("sftp-port".to_string(), opts.port.clone()),
            ("sftp-user".to_string(), opts.user.clone()),
            ("sftp-pass".to_string(), opts.password.clone()),
            ("allow-other".to_string(), Output::literal("true")),
            ("path".to_string(), Output::literal(self.path(rel))),
        ]);
        VolumeSpec {
            driver: Some(RCLONE_DRIVER.to_string()),
            driver_opts,
        }
    }
}

/// Declares a volume backed by the rclone sftp driver
pub fn sftp_volume(
    scope: &mut ComponentScope<'_>,
    storage: SftpStorage<'_>,
    name: &str,
    rel_path: &str,
) -> Result<ResourceRef, DeclareError> {
    scope.declare(name, storage.volume_spec(rel_path), ResourceOptions::new())
}

/// Inputs shared by the kubernetes services
#[derive(Clone, Debug, Default)]
pub struct KubeServiceArgs {
    pub network: Option<ResourceRef>,
    pub platform: Option<String>,
    pub provider: Option<KubeProvider>,
    /// Public hostname routed to the service
    pub domain: Option<String>,
    pub assets_dir: PathBuf,
}

impl KubeServiceArgs {
    pub fn require_network(&self, component: &str) -> Result<&ResourceRef, DeclareError> {
        self.network
            .as_ref()
            .ok_or_else(|| DeclareError::missing("network", component))
    }

    pub fn require_platform(&self, component: &str) -> Result<&str, DeclareError> {
        self.platform
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| DeclareError::missing("platform", component))
    }

    pub fn require_provider(&self, component: &str) -> Result<&KubeProvider, DeclareError> {
        self.provider
            .as_ref()
            .ok_or_else(|| DeclareError::missing("provider", component))
    }

    pub fn require_domain(&self, component: &str) -> Result<&str, DeclareError> {
        self.domain
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| DeclareError::missing("domain", component))
    }

    pub fn asset(&self, rel: &str) -> PathBuf {
        self.assets_dir.join(rel)
    }
}

/// `KEY=value` env entry
pub fn env(key: &str, value: impl Into<Output>) -> Output {
    let value: Output = value.into();
    interpolate!("{}={}", key, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> SftpDriverOpts {
        SftpDriverOpts::new("nas.lan", 22, "homelab", Output::literal("hunter2"))
    }

    #[test]
    fn test_storage_path_joins_once() {
        let opts = opts();
        let storage = SftpStorage {
            opts: &opts,
            base_path: "/srv/homelab/",
        };
        assert_eq!(storage.path("/grafana/data"), "/srv/homelab/grafana/data");

        let root = SftpStorage {
            opts: &opts,
            base_path: "/",
        };
        assert_eq!(root.path("grafana/data"), "/grafana/data");
    }

    #[test]
    fn test_volume_spec_driver_opts() {
        let opts = opts();
        let storage = SftpStorage {
            opts: &opts,
            base_path: "/",
        };
        let spec = storage.volume_spec("grafana/data");

        assert_eq!(spec.driver.as_deref(), Some(RCLONE_DRIVER));
        assert_eq!(spec.driver_opts["type"].render(false), "sftp");
        assert_eq!(spec.driver_opts["sftp-port"].render(false), "22");
        assert_eq!(spec.driver_opts["allow-other"].render(false), "true");
        assert_eq!(spec.driver_opts["path"].render(false), "/grafana/data");
        assert!(spec.driver_opts["sftp-pass"].is_secret());
    }

    #[test]
    fn test_require_storage_reports_missing_field() {
        let mut args = DockerServiceArgs::default();
        let err = args.require_storage("grafana").unwrap_err();
        assert!(matches!(err, DeclareError::MissingInput { field: "driver_opts", .. }));

        args.driver_opts = Some(opts());
        args.sftp_base_path = None;
        let err = args.require_storage("grafana").unwrap_err();
        assert!(matches!(err, DeclareError::MissingInput { field: "sftp_base_path", .. }));
    }

    #[test]
    fn test_env_entry() {
        let entry = env("POSTGRES_PASSWORD", Output::secret("pw"));
        assert!(entry.is_secret());
        assert_eq!(entry.render(true), "POSTGRES_PASSWORD=pw");
    }
}
