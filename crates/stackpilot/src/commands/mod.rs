pub mod logs;
pub mod proxy;
pub mod stack;
pub mod status;

use colored::Colorize;
use serde::Serialize;
use stackpilot::StackManager;
use stackpilot_config::Settings;
use stackpilot_container::{ComposeCli, ContainerRuntime, DockerRuntime};
use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;

/// 出力形式
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// 進捗メッセージを表示する。`--json` では標準出力に JSON 以外を出さない
    pub fn progress(&self, message: impl Display) {
        let _ = self.write_progress(&mut std::io::stdout(), message);
    }

    fn write_progress(&self, out: &mut impl Write, message: impl Display) -> std::io::Result<()> {
        if self.json {
            return Ok(());
        }
        writeln!(out, "{}", message)
    }
}

/// Docker に接続する（失敗時は対処方法を表示）
pub async fn connect_runtime() -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    match DockerRuntime::connect().await {
        Ok(runtime) => Ok(Arc::new(runtime)),
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Docker接続エラー".red().bold());
            eprintln!();
            eprintln!("{}", "原因:".yellow());
            eprintln!("  {}", e);
            eprintln!();
            eprintln!("{}", "解決方法:".yellow());
            eprintln!("  • Dockerが起動しているか確認してください");
            eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
            Err(anyhow::anyhow!("Docker接続に失敗しました"))
        }
    }
}

pub async fn connect(settings: &Settings) -> anyhow::Result<StackManager> {
    let runtime = connect_runtime().await?;
    let compose = Arc::new(ComposeCli::new(
        settings.compose_command.clone(),
        settings.up_timeout(),
        settings.command_timeout(),
    ));
    Ok(StackManager::new(settings.clone(), runtime, compose))
}
