//! 资源标识与通用声明结构

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::docker::{ContainerSpec, ImageSpec, NetworkSpec, RegistryImageSpec, VolumeSpec};
use crate::domain::kube::{
    ConfigMapSpec, CustomResourceSpec, DeploymentSpec, KubeProvider, NamespaceSpec, ObjectMeta,
    Resolver, ServiceSpec,
};
use crate::domain::output::{Attribute, Output};
use crate::error::ResolveError;

/// Provider 家族
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    Docker,
    Kubernetes,
}

impl ProviderFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderFamily::Docker => "docker",
            ProviderFamily::Kubernetes => "kubernetes",
        }
    }
}

/// 资源类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    RegistryImage,
    Image,
    Network,
    Volume,
    Container,
    Namespace,
    ConfigMap,
    Deployment,
    Service,
    CustomResource,
}

impl ResourceKind {
    /// Provider 类型标识（出现在 URN 中）
    pub fn type_token(&self) -> &'static str {
        match self {
            ResourceKind::RegistryImage => "docker:index:RegistryImage",
            ResourceKind::Image => "docker:index:Image",
            ResourceKind::Network => "docker:index:Network",
            ResourceKind::Volume => "docker:index:Volume",
            ResourceKind::Container => "docker:index:Container",
            ResourceKind::Namespace => "kubernetes:core/v1:Namespace",
            ResourceKind::ConfigMap => "kubernetes:core/v1:ConfigMap",
            ResourceKind::Deployment => "kubernetes:apps/v1:Deployment",
            ResourceKind::Service => "kubernetes:core/v1:Service",
            ResourceKind::CustomResource => "kubernetes:apiextensions:CustomResource",
        }
    }

    /// 简短名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::RegistryImage => "registry_image",
            ResourceKind::Image => "image",
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
            ResourceKind::Container => "container",
            ResourceKind::Namespace => "namespace",
            ResourceKind::ConfigMap => "config_map",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
            ResourceKind::CustomResource => "custom_resource",
        }
    }

    pub fn provider(&self) -> ProviderFamily {
        match self {
            ResourceKind::RegistryImage
            | ResourceKind::Image
            | ResourceKind::Network
            | ResourceKind::Volume
            | ResourceKind::Container => ProviderFamily::Docker,
            _ => ProviderFamily::Kubernetes,
        }
    }
}

/// 资源在 stack 内的唯一键：类型 + 逻辑名称
///
/// 同一份声明重复执行得到相同的 ID。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    kind: ResourceKind,
    name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.kind.as_str(), self.name)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 已声明资源的句柄，用于取其延迟输出
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRef {
    id: ResourceId,
}

impl ResourceRef {
    pub(crate) fn new(id: ResourceId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn output(&self, attr: Attribute) -> Output {
        Output::reference(self.id.clone(), attr)
    }

    /// Provider 分配的 ID（docker network id、k8s namespace 名称等）
    pub fn output_id(&self) -> Output {
        self.output(Attribute::Id)
    }

    pub fn name(&self) -> Output {
        self.output(Attribute::Name)
    }

    pub fn hostname(&self) -> Output {
        self.output(Attribute::Hostname)
    }

    pub fn sha256_digest(&self) -> Output {
        self.output(Attribute::Sha256Digest)
    }

    pub fn repo_digest(&self) -> Output {
        self.output(Attribute::RepoDigest)
    }

    pub fn image_name(&self) -> Output {
        self.output(Attribute::ImageName)
    }

    pub fn mountpoint(&self) -> Output {
        self.output(Attribute::Mountpoint)
    }

    pub fn metadata_name(&self) -> Output {
        self.output(Attribute::MetadataName)
    }
}

impl From<&ResourceRef> for ResourceId {
    fn from(value: &ResourceRef) -> Self {
        value.id.clone()
    }
}

/// 声明选项
#[derive(Clone, Debug, Default)]
pub struct ResourceOptions {
    /// 显式依赖，必须覆盖声明中引用到的所有资源
    pub depends_on: Vec<ResourceId>,
    /// Kubernetes 资源使用的集群
    pub provider: Option<KubeProvider>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depends_on<'a>(mut self, deps: impl IntoIterator<Item = &'a ResourceRef>) -> Self {
        for dep in deps {
            if !self.depends_on.contains(dep.id()) {
                self.depends_on.push(dep.id().clone());
            }
        }
        self
    }

    pub fn provider(mut self, provider: &KubeProvider) -> Self {
        self.provider = Some(provider.clone());
        self
    }
}

/// 资源规格
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    RegistryImage(RegistryImageSpec),
    Image(ImageSpec),
    Network(NetworkSpec),
    Volume(VolumeSpec),
    Container(Box<ContainerSpec>),
    Namespace(NamespaceSpec),
    ConfigMap(ConfigMapSpec),
    Deployment(DeploymentSpec),
    Service(ServiceSpec),
    CustomResource(CustomResourceSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::RegistryImage(_) => ResourceKind::RegistryImage,
            ResourceSpec::Image(_) => ResourceKind::Image,
            ResourceSpec::Network(_) => ResourceKind::Network,
            ResourceSpec::Volume(_) => ResourceKind::Volume,
            ResourceSpec::Container(_) => ResourceKind::Container,
            ResourceSpec::Namespace(_) => ResourceKind::Namespace,
            ResourceSpec::ConfigMap(_) => ResourceKind::ConfigMap,
            ResourceSpec::Deployment(_) => ResourceKind::Deployment,
            ResourceSpec::Service(_) => ResourceKind::Service,
            ResourceSpec::CustomResource(_) => ResourceKind::CustomResource,
        }
    }

    /// Kubernetes 资源的元数据
    pub fn metadata(&self) -> Option<&ObjectMeta> {
        match self {
            ResourceSpec::Namespace(spec) => Some(&spec.metadata),
            ResourceSpec::ConfigMap(spec) => Some(&spec.metadata),
            ResourceSpec::Deployment(spec) => Some(&spec.metadata),
            ResourceSpec::Service(spec) => Some(&spec.metadata),
            ResourceSpec::CustomResource(spec) => Some(&spec.metadata),
            _ => None,
        }
    }

    /// 解析延迟值后的规格；Kubernetes 资源即为 manifest
    pub fn render(&self, logical_name: &str, resolve: &Resolver<'_>) -> Result<Value, ResolveError> {
        match self {
            ResourceSpec::RegistryImage(spec) => {
                Ok(json!({ "name": spec.name, "platform": spec.platform }))
            }
            ResourceSpec::Image(spec) => Ok(json!({
                "image_name": spec.image_name,
                "context": spec.context.display().to_string(),
                "dockerfile": spec.dockerfile,
                "platform": spec.platform,
                "skip_push": spec.skip_push,
            })),
            ResourceSpec::Network(spec) => {
                Ok(json!({ "driver": spec.driver, "internal": spec.internal }))
            }
            ResourceSpec::Volume(spec) => spec.render(resolve),
            ResourceSpec::Container(spec) => spec.render(resolve),
            ResourceSpec::Namespace(spec) => spec.manifest(logical_name, resolve),
            ResourceSpec::ConfigMap(spec) => spec.manifest(logical_name, resolve),
            ResourceSpec::Deployment(spec) => spec.manifest(logical_name, resolve),
            ResourceSpec::Service(spec) => spec.manifest(logical_name, resolve),
            ResourceSpec::CustomResource(spec) => spec.manifest(logical_name, resolve),
        }
    }

    /// 规格中通过延迟值引用到的所有资源
    pub fn referenced_ids(&self) -> BTreeSet<ResourceId> {
        match self {
            ResourceSpec::RegistryImage(_) | ResourceSpec::Image(_) | ResourceSpec::Network(_) => {
                BTreeSet::new()
            }
            ResourceSpec::Volume(spec) => spec.referenced_ids(),
            ResourceSpec::Container(spec) => spec.referenced_ids(),
            ResourceSpec::Namespace(spec) => spec.metadata.referenced_ids(),
            ResourceSpec::ConfigMap(spec) => spec.metadata.referenced_ids(),
            ResourceSpec::Deployment(spec) => spec.referenced_ids(),
            ResourceSpec::Service(spec) => spec.metadata.referenced_ids(),
            ResourceSpec::CustomResource(spec) => spec.referenced_ids(),
        }
    }
}

macro_rules! impl_from_spec {
    ($($spec:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$spec> for ResourceSpec {
                fn from(spec: $spec) -> Self {
                    ResourceSpec::$variant(spec)
                }
            }
        )+
    };
}

impl_from_spec! {
    RegistryImageSpec => RegistryImage,
    ImageSpec => Image,
    NetworkSpec => Network,
    VolumeSpec => Volume,
    NamespaceSpec => Namespace,
    ConfigMapSpec => ConfigMap,
    DeploymentSpec => Deployment,
    ServiceSpec => Service,
    CustomResourceSpec => CustomResource,
}

impl From<ContainerSpec> for ResourceSpec {
    fn from(spec: ContainerSpec) -> Self {
        ResourceSpec::Container(Box::new(spec))
    }
}

/// 已声明的资源
#[derive(Clone, Debug, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    pub urn: String,
    /// 所属组件（`type::name`）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub depends_on: Vec<ResourceId>,
    #[serde(skip)]
    pub provider: Option<KubeProvider>,
    pub spec: ResourceSpec,
}

impl Resource {
    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn kind(&self) -> ResourceKind {
        self.id.kind()
    }
}
