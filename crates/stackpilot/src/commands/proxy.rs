use super::Output;
use colored::Colorize;
use serde::Serialize;
use stackpilot::{ProxyManager, ProxySnapshot};

#[derive(Serialize)]
struct ProxySummary<'a> {
    container: &'a str,
    image: &'a str,
    acme_email: Option<&'a str>,
    dashboard_domain: Option<&'a str>,
    dashboard_enabled: bool,
}

impl<'a> From<&'a ProxySnapshot> for ProxySummary<'a> {
    fn from(snapshot: &'a ProxySnapshot) -> Self {
        Self {
            container: &snapshot.spec.name,
            image: &snapshot.spec.image,
            acme_email: snapshot.acme_email.as_deref(),
            dashboard_domain: snapshot.dashboard_domain.as_deref(),
            dashboard_enabled: snapshot.dashboard_enabled,
        }
    }
}

fn print_snapshot(snapshot: &ProxySnapshot, output: Output) -> anyhow::Result<()> {
    if output.json {
        return output.print_json(&ProxySummary::from(snapshot));
    }

    let unknown = "(不明)".dimmed().to_string();
    println!("{} {}", "コンテナ:".bold(), snapshot.spec.name.cyan());
    println!("{} {}", "イメージ:".bold(), snapshot.spec.image);
    println!(
        "{} {}",
        "ACME メール:".bold(),
        snapshot.acme_email.clone().unwrap_or_else(|| unknown.clone())
    );
    println!(
        "{} {}",
        "ダッシュボード:".bold(),
        if snapshot.dashboard_enabled {
            "有効".green()
        } else {
            "無効".dimmed()
        }
    );
    println!(
        "{} {}",
        "ダッシュボードのドメイン:".bold(),
        snapshot.dashboard_domain.clone().unwrap_or(unknown)
    );
    Ok(())
}

pub async fn show(proxy: &ProxyManager, output: Output) -> anyhow::Result<()> {
    let snapshot = proxy.snapshot().await?;
    print_snapshot(&snapshot, output)
}

pub async fn dashboard(proxy: &ProxyManager, enabled: bool, output: Output) -> anyhow::Result<()> {
    output.progress(
        format!(
            "ダッシュボードを{}にしてプロキシを再作成中...",
            if enabled { "有効" } else { "無効" }
        )
        .blue(),
    );

    let snapshot = proxy.set_dashboard(enabled).await?;
    if snapshot.dashboard_enabled && snapshot.dashboard_domain.is_none() {
        eprintln!(
            "{}",
            "⚠ ダッシュボードのドメインを読み取れませんでした（ルーティングラベルを確認してください）"
                .yellow()
        );
    }
    print_snapshot(&snapshot, output)
}
