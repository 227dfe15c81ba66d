//! 命令执行器
//!
//! 提供统一的命令执行接口，支持：
//! - 实时日志流式输出（同时收集完整输出）
//! - stdin 输入（kubectl apply -f -）
//! - 超时与取消

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::domain::apply::LogLine;

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 写入 stdin 失败
    StdinFailed(std::io::Error),
    /// 命令超时
    Timeout,
    /// 命令被取消
    Cancelled,
    /// 等待命令完成失败
    WaitFailed(std::io::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::StdinFailed(e) => write!(f, "Failed to write command input: {}", e),
            CommandError::Timeout => write!(f, "Command timed out"),
            CommandError::Cancelled => write!(f, "Command was cancelled"),
            CommandError::WaitFailed(e) => write!(f, "Failed to wait for command: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e)
            | CommandError::StdinFailed(e)
            | CommandError::WaitFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// 命令执行结果
#[derive(Debug)]
pub struct CommandOutput {
    /// 退出状态
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout 去掉首尾空白
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

impl CommandRunner {
    /// 执行命令，逐行转发输出到日志通道，并收集完整输出
    ///
    /// # Arguments
    /// * `program` - 要执行的程序
    /// * `args` - 命令行参数
    /// * `work_dir` - 工作目录，None 时继承当前目录
    /// * `log_tx` - 日志发送通道
    /// * `cancel` - 取消令牌
    /// * `timeout` - 超时时间
    pub async fn run_with_streaming(
        program: &str,
        args: &[String],
        work_dir: Option<&Path>,
        log_tx: Option<&broadcast::Sender<LogLine>>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = work_dir {
            command.current_dir(dir);
        }
        Self::run_inner(command, None, log_tx, cancel, timeout).await
    }

    /// 执行命令并把 `input` 写入 stdin
    pub async fn run_with_input(
        program: &str,
        args: &[String],
        input: &str,
        log_tx: Option<&broadcast::Sender<LogLine>>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let command = {
            let mut command = Command::new(program);
            command.args(args);
            command
        };
        Self::run_inner(command, Some(input.to_string()), log_tx, cancel, timeout).await
    }

    async fn run_inner(
        mut command: Command,
        input: Option<String>,
        log_tx: Option<&broadcast::Sender<LogLine>>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let stdin = if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut child = command
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CommandError::SpawnFailed)?;

        let stdout_task = tokio::spawn(collect_lines(
            child.stdout.take(),
            "stdout",
            log_tx.cloned(),
        ));
        let stderr_task = tokio::spawn(collect_lines(
            child.stderr.take(),
            "stderr",
            log_tx.cloned(),
        ));

        // 写入放在独立任务中，子进程不读 stdin 时仍受超时和取消约束
        let stdin_task = match (input, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => Some(tokio::spawn(async move {
                pipe.write_all(input.as_bytes()).await
                // pipe 在此处 drop，子进程读到 EOF
            })),
            _ => None,
        };

        // 等待命令完成，支持超时和取消
        let status = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Command cancelled, killing process");
                abort(stdin_task);
                let _ = child.kill().await;
                return Err(CommandError::Cancelled);
            }
            _ = tokio::time::sleep(timeout) => {
                error!("Command timed out after {:?}", timeout);
                abort(stdin_task);
                let _ = child.kill().await;
                return Err(CommandError::Timeout);
            }
            status = child.wait() => status.map_err(CommandError::WaitFailed)?,
        };

        if let Some(task) = stdin_task {
            if let Ok(Err(e)) = task.await {
                return Err(CommandError::StdinFailed(e));
            }
        }

        // 等待日志读取完成
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(CommandOutput {
            status,
            stdout,
            stderr,
        })
    }
}

fn abort(task: Option<tokio::task::JoinHandle<std::io::Result<()>>>) {
    if let Some(task) = task {
        task.abort();
    }
}

async fn collect_lines<R>(
    reader: Option<R>,
    stream: &'static str,
    log_tx: Option<broadcast::Sender<LogLine>>,
) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(reader) = reader else {
        return collected;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(tx) = &log_tx {
            let _ = tx.send(LogLine::new(stream, line.clone()));
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_collects_and_streams_stdout() {
        let (tx, mut rx) = broadcast::channel(16);
        let output = CommandRunner::run_with_streaming(
            "echo",
            &args(&["hello"]),
            None,
            Some(&tx),
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout_trimmed(), "hello");
        let line = rx.recv().await.unwrap();
        assert_eq!(line.stream, "stdout");
        assert_eq!(line.content, "hello");
    }

    #[tokio::test]
    async fn test_run_with_input_pipes_stdin() {
        let output = CommandRunner::run_with_input(
            "cat",
            &[],
            "kind: Namespace\n",
            None,
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(output.stdout, "kind: Namespace\n");
    }

    #[tokio::test]
    async fn test_unread_stdin_still_times_out() {
        // larger than a pipe buffer; sleep never reads it
        let input = "x".repeat(1 << 20);
        let result = CommandRunner::run_with_input(
            "sleep",
            &args(&["5"]),
            &input,
            None,
            &CancellationToken::new(),
            Duration::from_millis(200),
        )
        .await;

        assert!(matches!(result, Err(CommandError::Timeout)));
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let result = CommandRunner::run_with_streaming(
            "nonexistent_command_12345",
            &[],
            None,
            None,
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let result = CommandRunner::run_with_streaming(
            "sleep",
            &args(&["5"]),
            None,
            None,
            &CancellationToken::new(),
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(result, Err(CommandError::Timeout)));
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = CommandRunner::run_with_streaming(
            "sleep",
            &args(&["5"]),
            None,
            None,
            &cancel,
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(CommandError::Cancelled)));
    }
}
