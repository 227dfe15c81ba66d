//! 领域模型模块
//!
//! 纯数据结构：资源规格、延迟值、运行记录。不直接调用 docker / kubectl。

pub mod apply;
pub mod docker;
pub mod kube;
pub mod output;
pub mod resource;

// Re-exports for convenience
pub use apply::{ApplyReport, ApplyStep, LogLine, RunStatus, StepStatus};
pub use output::{Attribute, Output, OutputRef, SECRET_PLACEHOLDER};
pub use resource::{
    ProviderFamily, Resource, ResourceId, ResourceKind, ResourceOptions, ResourceRef, ResourceSpec,
};
