//! 配置模块
//!
//! 配置文件、环境变量覆盖与 stack 级输入

pub mod env;
pub mod project;
pub mod store;

pub use env::EnvConfig;
pub use project::StackConfig;
pub use store::ConfigStore;
