//! Kubernetes 资源规格
//!
//! 每种规格都能渲染成 manifest（`serde_json::Value`），渲染时由调用方决定
//! 延迟值如何变成字符串：预览时直接显示占位，apply 时用已解析的输出。

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::domain::output::Output;
use crate::domain::resource::ResourceId;
use crate::error::ResolveError;

/// 延迟值解析函数
pub type Resolver<'a> = dyn Fn(&Output) -> Result<String, ResolveError> + 'a;

/// 目标集群
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KubeProvider {
    pub name: String,
    /// kubeconfig context，缺省使用当前 context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
}

/// 通用元数据
#[derive(Clone, Debug, Default, Serialize)]
pub struct ObjectMeta {
    /// 缺省使用资源逻辑名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Output>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn in_namespace(namespace: impl Into<Output>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// 最终使用的 metadata.name
    pub fn effective_name<'a>(&'a self, logical_name: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(logical_name)
    }

    pub fn referenced_ids(&self) -> BTreeSet<ResourceId> {
        self.namespace
            .iter()
            .flat_map(|ns| ns.references())
            .collect()
    }

    fn render(&self, logical_name: &str, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        let mut meta = Map::new();
        meta.insert("name".into(), json!(self.effective_name(logical_name)));
        if let Some(ns) = &self.namespace {
            meta.insert("namespace".into(), json!(resolve(ns)?));
        }
        if !self.labels.is_empty() {
            meta.insert("labels".into(), json!(self.labels));
        }
        Ok(Value::Object(meta))
    }
}

/// Namespace
#[derive(Clone, Debug, Default, Serialize)]
pub struct NamespaceSpec {
    pub metadata: ObjectMeta,
}

impl NamespaceSpec {
    pub fn manifest(&self, logical_name: &str, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        Ok(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": self.metadata.render(logical_name, resolve)?,
        }))
    }
}

/// ConfigMap
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConfigMapSpec {
    pub metadata: ObjectMeta,
    pub data: BTreeMap<String, String>,
}

impl ConfigMapSpec {
    pub fn manifest(&self, logical_name: &str, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        Ok(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": self.metadata.render(logical_name, resolve)?,
            "data": self.data,
        }))
    }
}

/// Pod 中的容器挂载
#[derive(Clone, Debug, Serialize)]
pub struct KubeVolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

/// Pod 中的容器
#[derive(Clone, Debug, Serialize)]
pub struct KubeContainer {
    pub name: String,
    pub image: Output,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<KubeVolumeMount>,
}

impl KubeContainer {
    pub fn new(name: impl Into<String>, image: impl Into<Output>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            image_pull_policy: None,
            env: Vec::new(),
            volume_mounts: Vec::new(),
        }
    }

    fn render(&self, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        let mut c = Map::new();
        c.insert("name".into(), json!(self.name));
        c.insert("image".into(), json!(resolve(&self.image)?));
        if let Some(policy) = &self.image_pull_policy {
            c.insert("imagePullPolicy".into(), json!(policy));
        }
        if !self.env.is_empty() {
            let env: Vec<Value> = self
                .env
                .iter()
                .map(|(k, v)| json!({ "name": k, "value": v }))
                .collect();
            c.insert("env".into(), Value::Array(env));
        }
        if !self.volume_mounts.is_empty() {
            let mounts: Vec<Value> = self
                .volume_mounts
                .iter()
                .map(|m| {
                    let mut v = json!({ "name": m.name, "mountPath": m.mount_path });
                    if let Some(sub) = &m.sub_path {
                        v["subPath"] = json!(sub);
                    }
                    v
                })
                .collect();
            c.insert("volumeMounts".into(), Value::Array(mounts));
        }
        Ok(Value::Object(c))
    }
}

/// 以 ConfigMap 为来源的 Pod 卷
#[derive(Clone, Debug, Serialize)]
pub struct KubeVolume {
    pub name: String,
    pub config_map: Output,
}

/// Deployment
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentSpec {
    pub metadata: ObjectMeta,
    pub replicas: u32,
    /// `app` 标签，同时用于 selector 与 Pod 模板
    pub app_label: String,
    pub containers: Vec<KubeContainer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<KubeVolume>,
}

impl DeploymentSpec {
    pub fn template_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), self.app_label.clone())])
    }

    pub fn referenced_ids(&self) -> BTreeSet<ResourceId> {
        let mut ids = self.metadata.referenced_ids();
        for c in &self.containers {
            ids.extend(c.image.references());
        }
        for v in &self.volumes {
            ids.extend(v.config_map.references());
        }
        ids
    }

    pub fn manifest(&self, logical_name: &str, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        let labels = self.template_labels();
        let containers = self
            .containers
            .iter()
            .map(|c| c.render(resolve))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pod_spec = json!({ "containers": containers });
        if !self.volumes.is_empty() {
            let volumes = self
                .volumes
                .iter()
                .map(|v| {
                    Ok(json!({
                        "name": v.name,
                        "configMap": { "name": resolve(&v.config_map)? },
                    }))
                })
                .collect::<Result<Vec<_>, ResolveError>>()?;
            pod_spec["volumes"] = Value::Array(volumes);
        }

        Ok(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": self.metadata.render(logical_name, resolve)?,
            "spec": {
                "selector": { "matchLabels": labels },
                "replicas": self.replicas,
                "template": {
                    "metadata": { "labels": labels },
                    "spec": pod_spec,
                },
            },
        }))
    }
}

/// Service 端口
#[derive(Clone, Debug, Serialize)]
pub struct ServicePort {
    pub port: u16,
    pub target_port: u16,
    pub protocol: String,
}

impl ServicePort {
    pub fn tcp(port: u16, target_port: u16) -> Self {
        Self {
            port,
            target_port,
            protocol: "TCP".to_string(),
        }
    }
}

/// Service
#[derive(Clone, Debug, Serialize)]
pub struct ServiceSpec {
    pub metadata: ObjectMeta,
    pub service_type: String,
    pub ports: Vec<ServicePort>,
    pub selector: BTreeMap<String, String>,
}

impl ServiceSpec {
    pub fn manifest(&self, logical_name: &str, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        let ports: Vec<Value> = self
            .ports
            .iter()
            .map(|p| json!({ "port": p.port, "targetPort": p.target_port, "protocol": p.protocol }))
            .collect();

        Ok(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": self.metadata.render(logical_name, resolve)?,
            "spec": {
                "type": self.service_type,
                "ports": ports,
                "selector": self.selector,
            },
        }))
    }
}

/// 自定义资源的字段树，叶子可以是延迟值
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Field {
    Str(Output),
    Int(i64),
    List(Vec<Field>),
    Map(BTreeMap<String, Field>),
}

impl Field {
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Field)>,
        K: Into<String>,
    {
        Field::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list(items: impl IntoIterator<Item = Field>) -> Self {
        Field::List(items.into_iter().collect())
    }

    fn collect_refs(&self, ids: &mut BTreeSet<ResourceId>) {
        match self {
            Field::Str(o) => ids.extend(o.references()),
            Field::Int(_) => {}
            Field::List(items) => items.iter().for_each(|f| f.collect_refs(ids)),
            Field::Map(map) => map.values().for_each(|f| f.collect_refs(ids)),
        }
    }

    fn render(&self, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        Ok(match self {
            Field::Str(o) => Value::String(resolve(o)?),
            Field::Int(i) => json!(i),
            Field::List(items) => Value::Array(
                items
                    .iter()
                    .map(|f| f.render(resolve))
                    .collect::<Result<_, _>>()?,
            ),
            Field::Map(map) => {
                let mut obj = Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), v.render(resolve)?);
                }
                Value::Object(obj)
            }
        })
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Str(Output::literal(value))
    }
}

impl From<Output> for Field {
    fn from(value: Output) -> Self {
        Field::Str(value)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Int(value)
    }
}

/// 自定义资源（KEDA HTTPScaledObject、Traefik IngressRoute 等）
#[derive(Clone, Debug, Serialize)]
pub struct CustomResourceSpec {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: Field,
}

impl CustomResourceSpec {
    pub fn referenced_ids(&self) -> BTreeSet<ResourceId> {
        let mut ids = self.metadata.referenced_ids();
        self.spec.collect_refs(&mut ids);
        ids
    }

    pub fn manifest(&self, logical_name: &str, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        Ok(json!({
            "apiVersion": self.api_version,
            "kind": self.kind,
            "metadata": self.metadata.render(logical_name, resolve)?,
            "spec": self.spec.render(resolve)?,
        }))
    }
}

/// 预览用解析：延迟值显示为占位符
pub fn preview_resolver(output: &Output) -> Result<String, ResolveError> {
    Ok(output.render(false))
}
