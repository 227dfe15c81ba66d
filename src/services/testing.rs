//! Shared fixtures for service declaration tests

use std::fs;
use tempfile::TempDir;

use crate::domain::docker::NetworkSpec;
use crate::domain::kube::KubeProvider;
use crate::domain::output::Output;
use crate::domain::resource::ResourceOptions;
use crate::services::args::{DockerServiceArgs, KubeServiceArgs, SftpDriverOpts};
use crate::state::Stack;

pub(crate) const WHITELIST: &str = "GithubReleaseBridge\nYoutubeBridge\n";

/// Assets directory with the files services read at declaration time
///
/// Removed when the returned guard drops.
pub(crate) fn assets_dir() -> TempDir {
    let dir = tempfile::Builder::new().prefix("homelab-assets").tempdir().unwrap();
    let root = dir.path();
    for plugin in ["readityourself", "archiveorg"] {
        fs::create_dir_all(root.join("shaarli/plugins").join(plugin)).unwrap();
    }
    fs::create_dir_all(root.join("rss_bridge")).unwrap();
    fs::write(root.join("rss_bridge/whitelist.txt"), WHITELIST).unwrap();
    dir
}

/// Stack holding only the shared proxy network, plus complete docker args
///
/// Keep the returned [`TempDir`] alive while declaring.
pub(crate) fn docker_fixture() -> (Stack, DockerServiceArgs, TempDir) {
    let mut stack = Stack::new("test");
    let proxy = stack
        .declare("proxy", NetworkSpec::default(), ResourceOptions::new())
        .unwrap();

    let mut args = DockerServiceArgs::new(&proxy);
    args.platform = Some("linux/amd64".to_string());
    args.driver_opts = Some(SftpDriverOpts::new(
        "nas.lan",
        22,
        "homelab",
        Output::secret("hunter2"),
    ));
    let assets = assets_dir();
    args.assets_dir = assets.path().to_path_buf();
    (stack, args, assets)
}

/// Same as [`docker_fixture`] for the kubernetes services
pub(crate) fn kube_fixture(domain: &str) -> (Stack, KubeServiceArgs, TempDir) {
    let (stack, docker, assets) = docker_fixture();
    let args = KubeServiceArgs {
        network: docker.network,
        platform: docker.platform,
        provider: Some(KubeProvider {
            name: "k8s".to_string(),
            context: Some("k3s".to_string()),
            kubeconfig: None,
        }),
        domain: Some(domain.to_string()),
        assets_dir: docker.assets_dir,
    };
    (stack, args, assets)
}
