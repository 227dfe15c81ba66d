//! Docker 资源规格

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::domain::kube::Resolver;
use crate::domain::output::Output;
use crate::domain::resource::ResourceId;
use crate::error::ResolveError;

/// rclone docker volume plugin
pub const RCLONE_DRIVER: &str = "rclone:latest";

/// 从镜像仓库拉取的镜像
#[derive(Clone, Debug, Serialize)]
pub struct RegistryImageSpec {
    /// 镜像坐标（如 ghcr.io/coder/coder:v2.9.0）
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl RegistryImageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: None,
        }
    }
}

/// 本地构建的镜像
#[derive(Clone, Debug, Serialize)]
pub struct ImageSpec {
    /// 构建后的镜像名（含 tag）
    pub image_name: String,
    /// 构建上下文目录
    pub context: PathBuf,
    /// Dockerfile 路径（相对于 context），默认 `Dockerfile`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    /// 目标平台（如 linux/arm64）
    pub platform: String,
    /// 只在本地构建，不推送
    pub skip_push: bool,
}

impl ImageSpec {
    pub fn local(image_name: impl Into<String>, context: PathBuf, platform: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            context,
            dockerfile: None,
            platform: platform.into(),
            skip_push: true,
        }
    }
}

/// 网络
#[derive(Clone, Debug, Default, Serialize)]
pub struct NetworkSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// 仅内部通信（不出外网）
    pub internal: bool,
}

/// 卷
#[derive(Clone, Debug, Default, Serialize)]
pub struct VolumeSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    pub driver_opts: BTreeMap<String, Output>,
}

impl VolumeSpec {
    pub fn referenced_ids(&self) -> BTreeSet<ResourceId> {
        self.driver_opts
            .values()
            .flat_map(|v| v.references())
            .collect()
    }

    pub fn render(&self, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        let mut opts = Map::new();
        for (key, value) in &self.driver_opts {
            opts.insert(key.clone(), json!(resolve(value)?));
        }
        Ok(json!({ "driver": self.driver, "driver_opts": opts }))
    }
}

/// 重启策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    #[default]
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

/// 端口协议
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// 端口映射
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    pub internal: u16,
    pub external: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub protocol: Protocol,
}

impl PortBinding {
    pub fn tcp(internal: u16, external: u16) -> Self {
        Self {
            internal,
            external,
            ip: None,
            protocol: Protocol::Tcp,
        }
    }

    pub fn udp(internal: u16, external: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            ..Self::tcp(internal, external)
        }
    }

    pub fn on_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// 挂载来源
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountSource {
    /// 命名卷
    Volume(Output),
    /// 宿主机路径
    HostPath(Output),
}

/// 容器挂载
#[derive(Clone, Debug, Serialize)]
pub struct VolumeMount {
    pub source: MountSource,
    pub container_path: String,
    pub read_only: bool,
}

/// 健康检查
#[derive(Clone, Debug, Default, Serialize)]
pub struct Healthcheck {
    pub tests: Vec<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// 容器
#[derive(Clone, Debug, Serialize)]
pub struct ContainerSpec {
    pub image: Output,
    pub restart: RestartPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<Output>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortBinding>,
    /// 依次加入的网络（network id 或内置网络名如 `bridge`）
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<Output>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeMount>,
    pub privileged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// 内存上限（MB）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    /// 内存 + swap 上限（MB）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_swap: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_adds: Vec<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<Healthcheck>,
}

impl ContainerSpec {
    pub fn new(image: Output) -> Self {
        Self {
            image,
            restart: RestartPolicy::default(),
            hostname: None,
            envs: Vec::new(),
            entrypoint: Vec::new(),
            command: Vec::new(),
            ports: Vec::new(),
            networks: Vec::new(),
            volumes: Vec::new(),
            privileged: false,
            user: None,
            memory: None,
            memory_swap: None,
            group_adds: Vec::new(),
            healthcheck: None,
        }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    pub fn env(mut self, env: impl Into<Output>) -> Self {
        self.envs.push(env.into());
        self
    }

    pub fn envs<I, T>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Output>,
    {
        self.envs.extend(envs.into_iter().map(Into::into));
        self
    }

    pub fn entrypoint<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.entrypoint = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn command<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn port(mut self, port: PortBinding) -> Self {
        self.ports.push(port);
        self
    }

    pub fn network(mut self, network: impl Into<Output>) -> Self {
        self.networks.push(network.into());
        self
    }

    /// 挂载命名卷
    pub fn volume(mut self, volume_name: Output, container_path: impl Into<String>) -> Self {
        self.volumes.push(VolumeMount {
            source: MountSource::Volume(volume_name),
            container_path: container_path.into(),
            read_only: false,
        });
        self
    }

    /// 挂载宿主机路径
    pub fn host_path(
        mut self,
        host_path: impl Into<Output>,
        container_path: impl Into<String>,
        read_only: bool,
    ) -> Self {
        self.volumes.push(VolumeMount {
            source: MountSource::HostPath(host_path.into()),
            container_path: container_path.into(),
            read_only,
        });
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn memory(mut self, memory_mb: u64, memory_swap_mb: u64) -> Self {
        self.memory = Some(memory_mb);
        self.memory_swap = Some(memory_swap_mb);
        self
    }

    pub fn group_add(mut self, group: impl Into<Output>) -> Self {
        self.group_adds.push(group.into());
        self
    }

    pub fn healthcheck(mut self, healthcheck: Healthcheck) -> Self {
        self.healthcheck = Some(healthcheck);
        self
    }

    /// 所有延迟值字段
    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        let mounts = self.volumes.iter().map(|m| match &m.source {
            MountSource::Volume(o) | MountSource::HostPath(o) => o,
        });
        let health = self.healthcheck.iter().flat_map(|h| h.tests.iter());

        std::iter::once(&self.image)
            .chain(self.envs.iter())
            .chain(self.networks.iter())
            .chain(mounts)
            .chain(self.group_adds.iter())
            .chain(health)
    }

    pub fn referenced_ids(&self) -> BTreeSet<ResourceId> {
        self.outputs().flat_map(|o| o.references()).collect()
    }

    /// 解析后的规格，用于预览
    pub fn render(&self, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        let all = |items: &[Output]| -> Result<Vec<String>, ResolveError> {
            items.iter().map(|o| resolve(o)).collect()
        };

        let volumes = self
            .volumes
            .iter()
            .map(|m| {
                let (kind, source) = match &m.source {
                    MountSource::Volume(o) => ("volume", o),
                    MountSource::HostPath(o) => ("host_path", o),
                };
                Ok(json!({
                    kind: resolve(source)?,
                    "container_path": m.container_path,
                    "read_only": m.read_only,
                }))
            })
            .collect::<Result<Vec<_>, ResolveError>>()?;

        let mut c = Map::new();
        c.insert("image".into(), json!(resolve(&self.image)?));
        c.insert("restart".into(), json!(self.restart.as_str()));
        if let Some(hostname) = &self.hostname {
            c.insert("hostname".into(), json!(hostname));
        }
        let lists = [
            ("envs", json!(all(self.envs.as_slice())?)),
            ("entrypoint", json!(self.entrypoint)),
            ("command", json!(self.command)),
            ("ports", json!(self.ports)),
            ("networks", json!(all(self.networks.as_slice())?)),
            ("volumes", json!(volumes)),
            ("group_adds", json!(all(self.group_adds.as_slice())?)),
        ];
        for (key, value) in lists {
            if value.as_array().is_some_and(|a| !a.is_empty()) {
                c.insert(key.into(), value);
            }
        }
        if self.privileged {
            c.insert("privileged".into(), json!(true));
        }
        if let Some(user) = &self.user {
            c.insert("user".into(), json!(user));
        }
        if let Some(memory) = self.memory {
            c.insert("memory".into(), json!(memory));
            c.insert("memory_swap".into(), json!(self.memory_swap));
        }
        if let Some(check) = &self.healthcheck {
            c.insert(
                "healthcheck".into(),
                json!({
                    "tests": all(check.tests.as_slice())?,
                    "interval": check.interval,
                    "timeout": check.timeout,
                    "start_period": check.start_period,
                    "retries": check.retries,
                }),
            );
        }
        Ok(Value::Object(c))
    }
}
