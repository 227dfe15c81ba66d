//! 进程级环境变量配置

use std::env;
use std::path::PathBuf;
use tracing::warn;

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 配置文件路径
    pub config_path: PathBuf,
    /// docker 可执行文件
    pub docker_bin: String,
    /// kubectl 可执行文件
    pub kubectl_bin: String,
    /// 日志格式
    pub log_format: LogFormat,
    /// 单条外部命令超时（秒）
    pub command_timeout_secs: u64,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let config_path = load_with_fallback("HOMELAB_CONFIG", "HOMELAB_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_CONFIG_FILE));
        if env::var("HOMELAB_CONFIG_FILE").is_ok() {
            warn!("HOMELAB_CONFIG_FILE is deprecated, use HOMELAB_CONFIG");
        }

        let docker_bin = load_with_fallback("HOMELAB_DOCKER_BIN", "DOCKER_BIN")
            .unwrap_or_else(|| "docker".to_string());
        let kubectl_bin = load_with_fallback("HOMELAB_KUBECTL_BIN", "KUBECTL_BIN")
            .unwrap_or_else(|| "kubectl".to_string());

        let log_format = env::var("HOMELAB_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or(LogFormat::Text);

        let command_timeout_secs = env::var("HOMELAB_COMMAND_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(constants::COMMAND_TIMEOUT_SECS);

        Self {
            config_path,
            docker_bin,
            kubectl_bin,
            log_format,
            command_timeout_secs,
        }
    }
}

/// 从环境变量加载，支持旧名称兼容
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// 默认配置文件
    pub const DEFAULT_CONFIG_FILE: &str = "homelab.toml";

    /// 环境变量覆盖前缀
    pub const ENV_PREFIX: &str = "HOMELAB_";

    /// 外部命令默认超时（秒）
    pub const COMMAND_TIMEOUT_SECS: u64 = 900; // 15 分钟

    /// 默认 stack 名称
    pub const DEFAULT_STACK_NAME: &str = "homelab";

    /// 默认共享网络
    pub const DEFAULT_NETWORK: &str = "proxy";

    /// SFTP 卷的默认根路径
    pub const DEFAULT_SFTP_BASE_PATH: &str = "/";

    /// SFTP 默认端口
    pub const DEFAULT_SFTP_PORT: u16 = 22;

    /// 容器默认时区
    pub const DEFAULT_TIMEZONE: &str = "Europe/Paris";

    /// 构建上下文与静态配置所在目录
    pub const DEFAULT_ASSETS_DIR: &str = "assets";

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_fallback() {
        env::set_var("HOMELAB_TEST_PRIMARY", "primary_value");
        env::set_var("HOMELAB_TEST_FALLBACK", "fallback_value");

        assert_eq!(
            load_with_fallback("HOMELAB_TEST_PRIMARY", "HOMELAB_TEST_FALLBACK"),
            Some("primary_value".to_string())
        );

        env::remove_var("HOMELAB_TEST_PRIMARY");
        assert_eq!(
            load_with_fallback("HOMELAB_TEST_PRIMARY", "HOMELAB_TEST_FALLBACK"),
            Some("fallback_value".to_string())
        );

        env::remove_var("HOMELAB_TEST_FALLBACK");
        assert_eq!(
            load_with_fallback("HOMELAB_TEST_PRIMARY", "HOMELAB_TEST_FALLBACK"),
            None
        );
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
