//! 基础设施模块
//!
//! 封装外部命令：进程执行、docker / kubectl 参数构造

pub mod command;
pub mod docker_cli;
pub mod kubectl;

pub use command::CommandRunner;
