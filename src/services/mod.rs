//! 服务层模块
//!
//! 服务声明（docker / kubernetes 目录）、依赖检查与执行计划、provisioning

pub mod apply;
pub mod args;
pub mod catalog;
pub mod docker;
pub mod kube;
pub mod plan;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::DeclareError;
use crate::state::{Component, Stack};

pub use args::{DockerServiceArgs, KubeServiceArgs, SftpDriverOpts};
pub use plan::{check_dependencies, DependencyIssue, Plan};

/// Component type for services backed by the docker provider
pub const DOCKER_SERVICE: &str = "docker_service";

/// Component type for services backed by the kubernetes provider
pub const KUBE_SERVICE: &str = "kube_service";

/// A self-hosted application expressed as a bundle of provider resources
///
/// `declare` validates its inputs first and returns
/// [`DeclareError::MissingInput`] before touching the stack; after that it
/// declares images, volumes, internal networks and containers in that order.
pub trait Service: Send + Sync {
    /// Component name, also the default hostname of the primary container
    fn name(&self) -> &str;

    fn component_type(&self) -> &'static str {
        DOCKER_SERVICE
    }

    fn declare(&self, stack: &mut Stack) -> Result<Component, DeclareError>;
}
