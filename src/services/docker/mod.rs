//! Docker service catalog
//!
//! One module per application. Each one owns its image coordinates, volume
//! layout and container wiring; shared plumbing lives here.

pub mod caddy;
pub mod coder;
pub mod concourse;
pub mod filestash;
pub mod forgejo;
pub mod grafana;
pub mod homepage;
pub mod ipfs;
pub mod kellnr;
pub mod ollama;
pub mod polr;
pub mod rss_bridge;
pub mod rss_forwarder;
pub mod rss_miniflux;
pub mod seedbox;
pub mod shaarli;
pub mod syncthing;
pub mod tailscale;
pub mod umami;

pub use caddy::Caddy;
pub use coder::Coder;
pub use concourse::Concourse;
pub use filestash::Filestash;
pub use forgejo::Forgejo;
pub use grafana::Grafana;
pub use homepage::Homepage;
pub use ipfs::Ipfs;
pub use kellnr::Kellnr;
pub use ollama::Ollama;
pub use polr::Polr;
pub use rss_bridge::RssBridge;
pub use rss_forwarder::RssForwarder;
pub use rss_miniflux::RssMiniflux;
pub use seedbox::Seedbox;
pub use shaarli::Shaarli;
pub use syncthing::Syncthing;
pub use tailscale::Tailscale;
pub use umami::Umami;

use std::path::Path;

use crate::domain::docker::{Healthcheck, ImageSpec, NetworkSpec, RegistryImageSpec};
use crate::domain::output::Output;
use crate::domain::resource::{ResourceOptions, ResourceRef};
use crate::error::DeclareError;
use crate::state::ComponentScope;

/// Pulls `image` for `platform`
pub(crate) fn registry_image(
    scope: &mut ComponentScope<'_>,
    name: &str,
    image: &str,
    platform: &str,
) -> Result<ResourceRef, DeclareError> {
    let spec = RegistryImageSpec {
        name: image.to_string(),
        platform: Some(platform.to_string()),
    };
    scope.declare(name, spec, ResourceOptions::new())
}

/// Builds `image_name` locally from `context`, never pushed
pub(crate) fn local_image(
    scope: &mut ComponentScope<'_>,
    name: &str,
    image_name: &str,
    context: &Path,
    platform: &str,
) -> Result<ResourceRef, DeclareError> {
    let spec = ImageSpec::local(image_name, context.to_path_buf(), platform);
    scope.declare(name, spec, ResourceOptions::new())
}

/// Network only reachable by the component's own containers
pub(crate) fn internal_network(
    scope: &mut ComponentScope<'_>,
    name: &str,
) -> Result<ResourceRef, DeclareError> {
    scope.declare(name, NetworkSpec::default(), ResourceOptions::new())
}

/// `CMD-SHELL pg_isready` check against `database` as `user`
pub(crate) fn pg_isready(user: &str, database: &str) -> Healthcheck {
    Healthcheck {
        tests: vec![
            Output::literal("CMD-SHELL"),
            Output::literal(format!("pg_isready -U {} -d {}", user, database)),
        ],
        interval: Some("5s".to_string()),
        timeout: Some("5s".to_string()),
        retries: Some(5),
        ..Healthcheck::default()
    }
}

/// Plain-exec `pg_isready` used by the slower-starting databases
pub(crate) fn pg_isready_slow(user: &str) -> Healthcheck {
    Healthcheck {
        tests: ["CMD", "pg_isready", "-U", user]
            .into_iter()
            .map(Output::literal)
            .collect(),
        interval: Some("10s".to_string()),
        start_period: Some("30s".to_string()),
        ..Healthcheck::default()
    }
}

/// `PUID`, `PGID` and `TZ` for linuxserver.io images
pub(crate) fn linuxserver_env(pgid: u32, timezone: &str) -> Vec<Output> {
    vec![
        Output::literal("PUID=1000"),
        Output::literal(format!("PGID={}", pgid)),
        Output::literal(format!("TZ={}", timezone)),
    ]
}
