//! 运行时状态模块
//!
//! 声明注册表与已解析的资源输出

pub mod outputs;
pub mod stack;

pub use outputs::ResolvedOutputs;
pub use stack::{Component, ComponentScope, Stack};
