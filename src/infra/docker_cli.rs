//! docker CLI 参数构造
//!
//! 只负责把规格翻译成参数列表，不执行命令。

use crate::domain::docker::{
    ContainerSpec, Healthcheck, ImageSpec, MountSource, NetworkSpec, PortBinding,
};
use crate::domain::kube::Resolver;
use crate::domain::output::SECRET_PLACEHOLDER;
use crate::error::ResolveError;

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

pub fn pull_args(image: &str, platform: Option<&str>) -> Vec<String> {
    let mut args = owned(&["pull"]);
    if let Some(platform) = platform {
        args.extend(owned(&["--platform", platform]));
    }
    args.push(image.to_string());
    args
}

pub fn build_args(spec: &ImageSpec) -> Vec<String> {
    let dockerfile = spec
        .context
        .join(spec.dockerfile.as_deref().unwrap_or("Dockerfile"));
    vec![
        "build".to_string(),
        "--progress=plain".to_string(),
        "--platform".to_string(),
        spec.platform.clone(),
        "-t".to_string(),
        spec.image_name.clone(),
        "-f".to_string(),
        dockerfile.display().to_string(),
        spec.context.display().to_string(),
    ]
}

/// `docker <object> inspect --format <format> <name>`
pub fn inspect_args(object: &str, name: &str, format: &str) -> Vec<String> {
    owned(&[object, "inspect", "--format", format, name])
}

pub fn network_create_args(name: &str, spec: &NetworkSpec) -> Vec<String> {
    let mut args = owned(&["network", "create"]);
    if let Some(driver) = &spec.driver {
        args.extend(owned(&["--driver", driver]));
    }
    if spec.internal {
        args.push("--internal".to_string());
    }
    args.push(name.to_string());
    args
}

/// `opts` are the already resolved driver options
pub fn volume_create_args<'a>(
    name: &str,
    driver: Option<&str>,
    opts: impl IntoIterator<Item = (&'a str, String)>,
) -> Vec<String> {
    let mut args = owned(&["volume", "create"]);
    if let Some(driver) = driver {
        args.extend(owned(&["--driver", driver]));
    }
    for (key, value) in opts {
        args.push("--opt".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(name.to_string());
    args
}

fn port_arg(port: &PortBinding) -> String {
    let host = match &port.ip {
        Some(ip) => format!("{}:{}", ip, port.external),
        None => port.external.to_string(),
    };
    format!("{}:{}/{}", host, port.internal, port.protocol.as_str())
}

fn healthcheck_args(check: &Healthcheck, resolve: &Resolver<'_>) -> Result<Vec<String>, ResolveError> {
    let tests = check
        .tests
        .iter()
        .map(|t| resolve(t))
        .collect::<Result<Vec<_>, _>>()?;

    // docker create 只接受 shell 形式的健康检查命令
    let cmd = match tests.split_first() {
        Some((mode, rest)) if mode == "CMD" || mode == "CMD-SHELL" => rest.join(" "),
        Some((mode, _)) if mode == "NONE" => return Ok(vec!["--no-healthcheck".to_string()]),
        _ => tests.join(" "),
    };

    let mut args = vec!["--health-cmd".to_string(), cmd];
    let timings = [
        ("--health-interval", &check.interval),
        ("--health-timeout", &check.timeout),
        ("--health-start-period", &check.start_period),
    ];
    for (flag, value) in timings {
        if let Some(value) = value {
            args.push(flag.to_string());
            args.push(value.clone());
        }
    }
    if let Some(retries) = check.retries {
        args.push("--health-retries".to_string());
        args.push(retries.to_string());
    }
    Ok(args)
}

/// `docker create` for a container; only the first network is attached here
pub fn container_create_args(
    name: &str,
    spec: &ContainerSpec,
    resolve: &Resolver<'_>,
) -> Result<Vec<String>, ResolveError> {
    let mut args = owned(&["create", "--name", name, "--restart", spec.restart.as_str()]);

    if let Some(hostname) = &spec.hostname {
        args.extend(owned(&["--hostname", hostname]));
    }
    for env in &spec.envs {
        args.push("-e".to_string());
        args.push(resolve(env)?);
    }
    for port in &spec.ports {
        args.push("-p".to_string());
        args.push(port_arg(port));
    }
    if let Some(network) = spec.networks.first() {
        args.push("--network".to_string());
        args.push(resolve(network)?);
    }
    for mount in &spec.volumes {
        let source = match &mount.source {
            MountSource::Volume(o) | MountSource::HostPath(o) => resolve(o)?,
        };
        let mut bind = format!("{}:{}", source, mount.container_path);
        if mount.read_only {
            bind.push_str(":ro");
        }
        args.push("-v".to_string());
        args.push(bind);
    }
    if spec.privileged {
        args.push("--privileged".to_string());
    }
    if let Some(user) = &spec.user {
        args.extend(owned(&["--user", user]));
    }
    if let Some(memory) = spec.memory {
        args.push("--memory".to_string());
        args.push(format!("{}m", memory));
    }
    if let Some(swap) = spec.memory_swap {
        args.push("--memory-swap".to_string());
        args.push(format!("{}m", swap));
    }
    for group in &spec.group_adds {
        args.push("--group-add".to_string());
        args.push(resolve(group)?);
    }
    if let Some(check) = &spec.healthcheck {
        args.extend(healthcheck_args(check, resolve)?);
    }

    // 多段 entrypoint：第一段走 --entrypoint，其余拼到命令前面
    let mut command = Vec::new();
    if let Some((first, rest)) = spec.entrypoint.split_first() {
        args.extend(owned(&["--entrypoint", first]));
        command.extend(rest.iter().cloned());
    }
    command.extend(spec.command.iter().cloned());

    args.push(resolve(&spec.image)?);
    args.extend(command);
    Ok(args)
}

/// Networks after the first, attached with `docker network connect`
pub fn network_connect_args(
    name: &str,
    spec: &ContainerSpec,
    resolve: &Resolver<'_>,
) -> Result<Vec<Vec<String>>, ResolveError> {
    spec.networks
        .iter()
        .skip(1)
        .map(|network| Ok(owned(&["network", "connect", &resolve(network)?, name])))
        .collect()
}

pub fn start_args(name: &str) -> Vec<String> {
    owned(&["start", name])
}

pub fn remove_container_args(name: &str) -> Vec<String> {
    owned(&["rm", "-f", name])
}

/// `object` is `network`, `volume` or `image`
pub fn remove_args(object: &str, name: &str) -> Vec<String> {
    owned(&[object, "rm", name])
}

/// Command line for error messages, with `-e` values masked
pub fn redacted(args: &[String]) -> String {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            let key = arg.split_once('=').map_or(arg.as_str(), |(k, _)| k);
            out.push(format!("{}={}", key, SECRET_PLACEHOLDER));
        } else {
            out.push(arg.clone());
        }
        mask_next = arg == "-e";
    }
    out.join(" ")
}

/// The daemon's wording for a missing object, across object types
pub fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such") || stderr.contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::docker::RestartPolicy;
    use crate::domain::kube::preview_resolver;
    use crate::domain::output::Output;
    use std::path::PathBuf;

    #[test]
    fn test_build_args() {
        let spec = ImageSpec::local("caddy", PathBuf::from("assets/caddy"), "linux/arm64");
        assert_eq!(
            build_args(&spec),
            vec![
                "build",
                "--progress=plain",
                "--platform",
                "linux/arm64",
                "-t",
                "caddy",
                "-f",
                "assets/caddy/Dockerfile",
                "assets/caddy",
            ]
        );
    }

    #[test]
    fn test_volume_create_args() {
        let args = volume_create_args(
            "grafana-data",
            Some("rclone:latest"),
            [("path", "/grafana/data".to_string()), ("type", "sftp".to_string())],
        );
        assert_eq!(
            args,
            vec![
                "volume",
                "create",
                "--driver",
                "rclone:latest",
                "--opt",
                "path=/grafana/data",
                "--opt",
                "type=sftp",
                "grafana-data",
            ]
        );
    }

    #[test]
    fn test_container_create_args() {
        let spec = ContainerSpec::new(Output::literal("sha256:abc"))
            .hostname("caddy")
            .restart(RestartPolicy::Always)
            .entrypoint(["caddy", "run", "--config", "/etc/caddy/Caddyfile"])
            .env("TZ=Europe/Paris")
            .port(PortBinding::udp(4001, 4001).on_ip("0.0.0.0"))
            .network("proxy")
            .network("bridge")
            .host_path("/etc/localtime", "/etc/localtime", true)
            .memory(2048, 2048);

        let args = container_create_args("caddy", &spec, &preview_resolver).unwrap();
        let joined = args.join(" ");
        assert!(joined.starts_with("create --name caddy --restart always --hostname caddy"));
        assert!(joined.contains("-e TZ=Europe/Paris"));
        assert!(joined.contains("-p 0.0.0.0:4001:4001/udp"));
        assert!(joined.contains("--network proxy"));
        assert!(!joined.contains("bridge"));
        assert!(joined.contains("-v /etc/localtime:/etc/localtime:ro"));
        assert!(joined.contains("--memory 2048m --memory-swap 2048m"));
        assert!(joined.ends_with("--entrypoint caddy sha256:abc run --config /etc/caddy/Caddyfile"));

        let connects = network_connect_args("caddy", &spec, &preview_resolver).unwrap();
        assert_eq!(connects, vec![vec!["network", "connect", "bridge", "caddy"]]);
    }

    #[test]
    fn test_healthcheck_shell_form() {
        let check = Healthcheck {
            tests: ["CMD", "pg_isready", "-U", "umami"]
                .into_iter()
                .map(Output::literal)
                .collect(),
            interval: Some("10s".to_string()),
            retries: Some(5),
            ..Healthcheck::default()
        };
        let args = healthcheck_args(&check, &preview_resolver).unwrap();
        assert_eq!(
            args,
            vec![
                "--health-cmd",
                "pg_isready -U umami",
                "--health-interval",
                "10s",
                "--health-retries",
                "5",
            ]
        );
    }

    #[test]
    fn test_redacted_masks_env_values() {
        let args: Vec<String> = ["create", "--name", "umami-db", "-e", "POSTGRES_PASSWORD=pw", "postgres:14"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            redacted(&args),
            "create --name umami-db -e POSTGRES_PASSWORD=[secret] postgres:14"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found("Error: No such container: coder"));
        assert!(is_not_found("Error response from daemon: network proxy not found"));
        assert!(!is_not_found("permission denied"));
    }
}
