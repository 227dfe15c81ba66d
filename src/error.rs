//! 统一错误类型
//!
//! 每一层一个枚举：声明期（`DeclareError`）、配置（`ConfigError`）、
//! 延迟值解析（`ResolveError`）、预览输出（`RenderError`）、执行期（`ProvisionError`）。
//! 子进程错误 `CommandError` 在 `infra::command` 中定义。

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::output::Attribute;
use crate::domain::resource::ResourceId;
use crate::infra::command::CommandError;

/// 声明期错误，发生时 stack 中不会留下半个服务
#[derive(Debug, Error)]
pub enum DeclareError {
    #[error("{component}: missing required input `{field}`")]
    MissingInput {
        field: &'static str,
        component: String,
    },

    #[error("resource {0} is already declared")]
    DuplicateResource(ResourceId),

    #[error("component {0} is already declared")]
    DuplicateComponent(String),

    #[error("dependency cycle among: {}", join_ids(.0))]
    DependencyCycle(Vec<ResourceId>),

    #[error("unknown service `{0}`")]
    UnknownService(String),

    #[error("failed to read asset {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DeclareError {
    pub fn missing(field: &'static str, component: impl Into<String>) -> Self {
        Self::MissingInput {
            field,
            component: component.into(),
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config value `{0}`")]
    Missing(String),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// 延迟值解析错误
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("output `{}` of {resource} is not available yet", .attr.as_str())]
    Unresolved { resource: ResourceId, attr: Attribute },
}

/// 执行期错误
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("`{program} {args}` exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to render manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("{resource}: {message}")]
    Inspect { resource: ResourceId, message: String },

    #[error("{resource} is not handled by the {provider} provisioner")]
    Unsupported {
        resource: ResourceId,
        provider: &'static str,
    },

    #[error("cancelled")]
    Cancelled,
}

/// 计划 / manifest 输出错误
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn join_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// 便捷类型别名
pub type DeclareResult<T> = Result<T, DeclareError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceKind;

    #[test]
    fn test_missing_input_message() {
        let err = DeclareError::missing("network", "coder");
        assert_eq!(err.to_string(), "coder: missing required input `network`");
    }

    #[test]
    fn test_cycle_message_lists_ids() {
        let err = DeclareError::DependencyCycle(vec![
            ResourceId::new(ResourceKind::Container, "a"),
            ResourceId::new(ResourceKind::Container, "b"),
        ]);
        assert_eq!(
            err.to_string(),
            "dependency cycle among: container::a, container::b"
        );
    }

    #[test]
    fn test_unresolved_message() {
        let err = ResolveError::Unresolved {
            resource: ResourceId::new(ResourceKind::Volume, "grafana-data"),
            attr: Attribute::Mountpoint,
        };
        assert_eq!(
            err.to_string(),
            "output `mountpoint` of volume::grafana-data is not available yet"
        );
    }
}
