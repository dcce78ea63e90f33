//! compose CLI ラッパー
//!
//! スタックディレクトリを作業ディレクトリ、スタック名をプロジェクト名として
//! `docker compose` を実行します。

use crate::error::{ContainerError, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// 強制終了後に出力の回収を待つ上限
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// compose コマンドの対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeTarget {
    /// スタックディレクトリ（作業ディレクトリ）
    pub dir: PathBuf,
    pub manifest: PathBuf,
    /// プロジェクト名（スタック名）
    pub project: String,
}

/// ログ取得オプション
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub lines: Option<usize>,
    pub service: Option<String>,
}

/// compose 操作のトレイト
///
/// 変更系の操作はコマンドの終了まで待ち、失敗時は標準出力と標準エラーをまとめて返します。
#[async_trait]
pub trait ComposeRunner: Send + Sync {
    /// `up -d`。成功時はコマンド出力を返す
    async fn up(&self, target: &ComposeTarget, env: &IndexMap<String, String>) -> Result<String>;

    async fn start(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()>;

    async fn stop(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()>;

    async fn restart(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()>;

    async fn down(&self, target: &ComposeTarget, remove_volumes: bool) -> Result<()>;

    async fn pull(&self, target: &ComposeTarget) -> Result<()>;

    async fn logs(&self, target: &ComposeTarget, options: &LogOptions) -> Result<Vec<String>>;
}

/// `docker compose` を子プロセスとして実行する実装
#[derive(Debug, Clone)]
pub struct ComposeCli {
    program: Vec<String>,
    up_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl ComposeCli {
    pub fn new(program: Vec<String>, up_timeout: Duration, command_timeout: Option<Duration>) -> Self {
        let program = if program.is_empty() {
            vec!["docker".to_string(), "compose".to_string()]
        } else {
            program
        };
        Self {
            program,
            up_timeout,
            command_timeout,
        }
    }

    /// 実行するコマンドライン（ログ・エラー表示用）
    fn describe(&self, target: &ComposeTarget, args: &[String]) -> String {
        let mut parts = self.program.clone();
        parts.extend(self.base_args(target));
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    fn base_args(&self, target: &ComposeTarget) -> Vec<String> {
        vec![
            "--compatibility".to_string(),
            "-p".to_string(),
            target.project.clone(),
            "-f".to_string(),
            target.manifest.display().to_string(),
        ]
    }

    async fn run(
        &self,
        target: &ComposeTarget,
        args: Vec<String>,
        env: &IndexMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let command_line = self.describe(target, &args);

        let mut cmd = Command::new(&self.program[0]);
        cmd.args(&self.program[1..]);
        cmd.args(self.base_args(target));
        cmd.args(&args);
        cmd.current_dir(&target.dir);
        cmd.envs(env.iter());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {}", command_line);

        let mut child = cmd.spawn()?;
        let stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let stderr_task = tokio::spawn(read_all(child.stderr.take()));

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    tracing::warn!(
                        "Command timed out after {}s: {}",
                        limit.as_secs(),
                        command_line
                    );
                    let _ = child.kill().await;
                    None
                }
            },
            None => Some(child.wait().await?),
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let output = combine_output(&stdout, &stderr);

        match status {
            Some(status) if status.success() => Ok(output),
            Some(_) => Err(ContainerError::CommandFailed {
                command: command_line,
                output,
            }),
            None => Err(ContainerError::CommandTimeout {
                command: command_line,
                secs: timeout.map(|t| t.as_secs()).unwrap_or_default(),
                output,
            }),
        }
    }
}

fn service_args(verb: &str, service: Option<&str>) -> Vec<String> {
    let mut args = vec![verb.to_string()];
    if let Some(service) = service {
        args.push(service.to_string());
    }
    args
}

#[async_trait]
impl ComposeRunner for ComposeCli {
    async fn up(&self, target: &ComposeTarget, env: &IndexMap<String, String>) -> Result<String> {
        let args = vec![
            "up".to_string(),
            "-d".to_string(),
            "--remove-orphans".to_string(),
        ];
        self.run(target, args, env, Some(self.up_timeout)).await
    }

    async fn start(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()> {
        self.run(
            target,
            service_args("start", service),
            &IndexMap::new(),
            self.command_timeout,
        )
        .await?;
        Ok(())
    }

    async fn stop(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()> {
        self.run(
            target,
            service_args("stop", service),
            &IndexMap::new(),
            self.command_timeout,
        )
        .await?;
        Ok(())
    }

    async fn restart(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()> {
        self.run(
            target,
            service_args("restart", service),
            &IndexMap::new(),
            self.command_timeout,
        )
        .await?;
        Ok(())
    }

    async fn down(&self, target: &ComposeTarget, remove_volumes: bool) -> Result<()> {
        let mut args = vec!["down".to_string(), "--remove-orphans".to_string()];
        if remove_volumes {
            args.push("-v".to_string());
        }
        self.run(target, args, &IndexMap::new(), self.command_timeout)
            .await?;
        Ok(())
    }

    async fn pull(&self, target: &ComposeTarget) -> Result<()> {
        self.run(
            target,
            vec!["pull".to_string()],
            &IndexMap::new(),
            Some(self.up_timeout),
        )
        .await?;
        Ok(())
    }

    async fn logs(&self, target: &ComposeTarget, options: &LogOptions) -> Result<Vec<String>> {
        let mut args = vec!["logs".to_string(), "--no-color".to_string()];
        if let Some(lines) = options.lines {
            args.push("--tail".to_string());
            args.push(lines.to_string());
        }
        if let Some(service) = &options.service {
            args.push(service.clone());
        }

        let output = self
            .run(target, args, &IndexMap::new(), self.command_timeout)
            .await?;
        Ok(split_lines(&output))
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// 読み取りタスクの結果を回収する（孫プロセスがパイプを保持していても待ち続けない）
async fn drain(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    }
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.trim_end().to_string(),
        (true, false) => stderr.trim_end().to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
    }
}

fn split_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
