use super::Output;
use colored::Colorize;
use serde::Serialize;
use stackpilot::lifecycle::list_stacks;
use stackpilot::{StackManager, run_bounded};
use stackpilot_config::Settings;
use stackpilot_core::{ServiceMetrics, ServiceState, StackInfo, StackStatus};

/// 複数スタックを問い合わせるときの同時実行数
const QUERY_CONCURRENCY: usize = 5;

/// スタックごとの結果（失敗してもバッチ全体は続行）
#[derive(Debug, Serialize)]
struct ItemResult<T> {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ItemResult<T> {
    fn from_result(name: String, result: stackpilot_core::Result<T>) -> Self {
        match result {
            Ok(value) => Self {
                name,
                result: Some(value),
                error: None,
            },
            Err(e) => Self {
                name,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}

fn resolve_names(manager: &StackManager, names: Vec<String>) -> anyhow::Result<Vec<String>> {
    if names.is_empty() {
        Ok(manager.list()?)
    } else {
        Ok(names)
    }
}

pub fn list(settings: &Settings, output: Output) -> anyhow::Result<()> {
    let names = list_stacks(settings)?;

    if output.json {
        return output.print_json(&names);
    }
    if names.is_empty() {
        println!("{}", "スタックはありません".dimmed());
        return Ok(());
    }
    for name in names {
        println!("  {}", name.cyan());
    }
    Ok(())
}

pub async fn status(
    manager: &StackManager,
    names: Vec<String>,
    output: Output,
) -> anyhow::Result<()> {
    let names = resolve_names(manager, names)?;

    let results = run_bounded(names, QUERY_CONCURRENCY, |name| async move {
        let result = manager.status(&name).await;
        ItemResult::from_result(name, result)
    })
    .await;

    if output.json {
        return output.print_json(&results);
    }
    if results.is_empty() {
        println!("{}", "スタックはありません".dimmed());
        return Ok(());
    }

    for item in &results {
        match (&item.result, &item.error) {
            (Some(info), _) => print_stack(info),
            (None, Some(error)) => {
                println!("{} {}", item.name.bold(), "エラー".red());
                println!("  {}", error.red());
            }
            (None, None) => {}
        }
        println!();
    }
    Ok(())
}

pub async fn metrics(
    manager: &StackManager,
    names: Vec<String>,
    output: Output,
) -> anyhow::Result<()> {
    let names = resolve_names(manager, names)?;

    let results = run_bounded(names, QUERY_CONCURRENCY, |name| async move {
        let result = manager.metrics(&name).await;
        ItemResult::from_result(name, result)
    })
    .await;

    if output.json {
        return output.print_json(&results);
    }

    for item in &results {
        println!("{}", item.name.bold());
        match (&item.result, &item.error) {
            (Some(metrics), _) if metrics.is_empty() => {
                println!("  {}", "コンテナはありません".dimmed());
            }
            (Some(metrics), _) => print_metrics(metrics),
            (None, Some(error)) => println!("  {}", error.red()),
            (None, None) => {}
        }
        println!();
    }
    Ok(())
}

pub fn print_stack(info: &StackInfo) {
    let status = match info.status {
        StackStatus::Running => info.status.as_str().green(),
        StackStatus::Partial => info.status.as_str().yellow(),
        StackStatus::Stopped => info.status.as_str().dimmed(),
        StackStatus::Unknown => info.status.as_str().red(),
    };
    println!("{} {}", info.name.bold(), status);

    for service in &info.services {
        let state = match service.status {
            ServiceState::Running => service.status.as_str().green(),
            ServiceState::Stopped => service.status.as_str().dimmed(),
            ServiceState::Error => service.status.as_str().red(),
        };
        let ready = if service.ready { "ready".green() } else { "-".dimmed() };
        println!("  {:<24} {:<10} {}", service.name.cyan(), state, ready);
    }
}

fn print_metrics(metrics: &[ServiceMetrics]) {
    println!(
        "  {}",
        format!(
            "{:<20} {:>8} {:>12} {:>12} {:>8} {:>12} {:>12}",
            "SERVICE", "CPU%", "MEM", "LIMIT", "MEM%", "NET RX", "NET TX"
        )
        .bold()
    );
    for m in metrics {
        let limit = if m.memory_limit == 0 {
            "unlimited".to_string()
        } else {
            format_bytes(m.memory_limit)
        };
        println!(
            "  {:<20} {:>8.2} {:>12} {:>12} {:>8.2} {:>12} {:>12}",
            m.name,
            m.cpu_percent,
            format_bytes(m.memory_used),
            limit,
            m.memory_percent,
            format_bytes(m.network_rx),
            format_bytes(m.network_tx),
        );
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
