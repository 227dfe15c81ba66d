//! 执行上下文
//!
//! 一次 apply / destroy 共享的运行信息：运行 ID、日志通道、取消令牌、命令超时

use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::env::constants::COMMAND_TIMEOUT_SECS;
use crate::domain::apply::LogLine;

/// 执行上下文
#[derive(Clone)]
pub struct ApplyContext {
    /// 运行 ID
    pub run_id: String,
    /// stack 名称
    pub stack: String,
    /// 子进程输出的广播通道
    pub log_tx: Option<broadcast::Sender<LogLine>>,
    /// 取消令牌
    pub cancel_token: CancellationToken,
    /// 单条命令的超时时间
    pub timeout: Duration,
}

impl ApplyContext {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            stack: stack.into(),
            log_tx: None,
            cancel_token: CancellationToken::new(),
            timeout: Duration::from_secs(COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_log_channel(mut self, tx: broadcast::Sender<LogLine>) -> Self {
        self.log_tx = Some(tx);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 发送日志
    pub fn log(&self, stream: &str, content: &str) {
        if let Some(ref tx) = self.log_tx {
            let _ = tx.send(LogLine::new(stream, content));
        }
    }

    pub fn log_stdout(&self, content: &str) {
        self.log("stdout", content);
    }

    pub fn log_stderr(&self, content: &str) {
        self.log("stderr", content);
    }

    /// 检查是否被取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
