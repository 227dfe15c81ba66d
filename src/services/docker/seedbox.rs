//! Media stack: rtorrent + flood, the *arr indexers, Jellyfin and jfa-go
//!
//! Everything shares one data volume mounted at `/data` so the downloaders
//! and the library see the same paths. Only Jellyfin takes the hostname
//! override; the rest are addressed as `seedbox-<app>`.

use crate::domain::docker::{ContainerSpec, PortBinding};
use crate::domain::resource::ResourceOptions;
use crate::error::DeclareError;
use crate::interpolate;
use crate::services::args::{env, sftp_volume, DockerServiceArgs};
use crate::services::docker::{internal_network, linuxserver_env, local_image, registry_image};
use crate::services::{Service, DOCKER_SERVICE};
use crate::state::{Component, Stack};

const MEDIA_GID: u32 = 1001;
const MEDIA_USER: &str = "1000:1001";
const BITTORRENT_PORT: u16 = 6881;

pub struct Seedbox {
    pub args: DockerServiceArgs,
}

impl Service for Seedbox {
    fn name(&self) -> &str {
        "seedbox"
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError> {
        let name = self.name();
        let network = self.args.require_network(name)?;
        let storage = self.args.require_storage(name)?;
        let platform = self.args.require_platform(name)?;
        let tz = self.args.timezone.as_str();

        let mut scope = stack.component(DOCKER_SERVICE, name)?;

        let jellyfin_image =
            registry_image(&mut scope, "jellyfin", "lscr.io/linuxserver/jellyfin:latest", platform)?;
        let radarr_image =
            registry_image(&mut scope, "radarr", "lscr.io/linuxserver/radarr:latest", platform)?;
        let sonarr_image =
            registry_image(&mut scope, "sonarr", "lscr.io/linuxserver/sonarr:latest", platform)?;
        let prowlarr_image =
            registry_image(&mut scope, "prowlarr", "lscr.io/linuxserver/prowlarr:latest", platform)?;
        let flood_image = registry_image(&mut scope, "flood", "jesec/flood:master", platform)?;
        let jfa_go_image = registry_image(&mut scope, "jfa-go", "hrfee/jfa-go:latest", platform)?;
        let flaresolverr_image = registry_image(
            &mut scope,
            "flaresolverr",
            "ghcr.io/flaresolverr/flaresolverr:latest",
            platform,
        )?;
        let rtorrent_image = local_image(
            &mut scope,
            "rtorrent",
            "rtorrent:alpine",
            &self.args.asset("seedbox/rtorrent-docker"),
            platform,
        )?;

        let data = sftp_volume(&mut scope, storage, "seedbox-data", "seedbox/data")?;
        let config = sftp_volume(&mut scope, storage, "seedbox-config", "seedbox/config")?;
        let radarr_config =
            sftp_volume(&mut scope, storage, "seedbox-radarr-config", "seedbox/radarr_config")?;
        let sonarr_config =
            sftp_volume(&mut scope, storage, "seedbox-sonarr-config", "seedbox/sonarr_config")?;
        let prowlarr_config = sftp_volume(
            &mut scope,
            storage,
            "seedbox-prowlarr-config",
            "seedbox/prowlarr_config",
        )?;
        let jellyfin_config = sftp_volume(
            &mut scope,
            storage,
            "seedbox-jellyfin-config",
            "seedbox/jellyfin_config",
        )?;
        let jfa_go_data =
            sftp_volume(&mut scope, storage, "seedbox-jfa-go-data", "seedbox/jfa_go_data")?;

        // prowlarr and flaresolverr talk to each other here
        let internal = internal_network(&mut scope, "internal-seedbox")?;

        // radarr/sonarr import finished downloads through rtorrent's session dir
        let rtorrent_session = interpolate!("{}/.local/share/rtorrent", config.mountpoint());

        scope.declare(
            "flood",
            ContainerSpec::new(flood_image.sha256_digest())
                .hostname("seedbox-flood")
                .user(MEDIA_USER)
                .env("HOME=/config")
                .network(network.output_id())
                .volume(data.name(), "/data")
                .volume(config.name(), "/config"),
            ResourceOptions::new().depends_on([network, &flood_image, &data, &config]),
        )?;

        for (app, image, app_config) in [
            ("radarr", &radarr_image, &radarr_config),
            ("sonarr", &sonarr_image, &sonarr_config),
        ] {
            scope.declare(
                app,
                ContainerSpec::new(image.sha256_digest())
                    .hostname(format!("seedbox-{}", app))
                    .envs(linuxserver_env(MEDIA_GID, tz))
                    .network(network.output_id())
                    .volume(data.name(), "/data")
                    .host_path(&rtorrent_session, "/config/.local/share/rtorrent", false)
                    .volume(app_config.name(), "/config"),
                ResourceOptions::new().depends_on([
                    network,
                    image,
                    &data,
                    &config,
                    app_config,
                ]),
            )?;
        }

        scope.declare(
            "prowlarr",
            ContainerSpec::new(prowlarr_image.sha256_digest())
                .hostname("seedbox-prowlarr")
                .envs(linuxserver_env(MEDIA_GID, tz))
                .network(network.output_id())
                .network(internal.output_id())
                .volume(prowlarr_config.name(), "/config"),
            ResourceOptions::new().depends_on([network, &internal, &prowlarr_image, &prowlarr_config]),
        )?;

        scope.declare(
            "flaresolverr",
            ContainerSpec::new(flaresolverr_image.sha256_digest())
                .hostname("seedbox-flaresolverr")
                .envs(["LOG_LEVEL=info", "LOG_HTML=false", "CAPTCHA_SOLVER=none"])
                .env(env("TZ", tz))
                .network(network.output_id())
                .network(internal.output_id()),
            ResourceOptions::new().depends_on([network, &internal, &flaresolverr_image]),
        )?;

        scope.declare(
            "rtorrent",
            ContainerSpec::new(rtorrent_image.image_name())
                .hostname("seedbox-rtorrent")
                .user(MEDIA_USER)
                .env("HOME=/config")
                .command(["-o", "system.daemon.set=true"])
                .memory(2048, 2048)
                .port(PortBinding::tcp(BITTORRENT_PORT, BITTORRENT_PORT))
                .port(PortBinding::udp(BITTORRENT_PORT, BITTORRENT_PORT))
                .volume(config.name(), "/config")
                .volume(data.name(), "/data"),
            ResourceOptions::new().depends_on([&rtorrent_image, &config, &data]),
        )?;

        let jellyfin = scope.declare(
            "jellyfin",
            ContainerSpec::new(jellyfin_image.sha256_digest())
                .hostname(self.args.hostname_or("seedbox-jellyfin"))
                .envs(linuxserver_env(MEDIA_GID, tz))
                .network(network.output_id())
                .volume(jellyfin_config.name(), "/config")
                .volume(data.name(), "/home"),
            ResourceOptions::new().depends_on([
                network,
                &jellyfin_image,
                &jellyfin_config,
                &data,
            ]),
        )?;

        scope.declare(
            "jfa-go",
            ContainerSpec::new(jfa_go_image.sha256_digest())
                .hostname("seedbox-jfa-go")
                .network(network.output_id())
                .volume(jellyfin_config.name(), "/jf")
                .host_path("/etc/localtime", "/etc/localtime", true)
                .volume(jfa_go_data.name(), "/data"),
            ResourceOptions::new().depends_on([
                network,
                &jfa_go_image,
                &jellyfin_config,
                &jfa_go_data,
                &jellyfin,
            ]),
        )?;

        scope.export("hostname", jellyfin.hostname());
        Ok(scope.finish())
    }
}
