use super::Output;
use crate::commands::status::print_stack;
use anyhow::Context;
use colored::Colorize;
use stackpilot::StackManager;
use stackpilot_core::StackConfig;
use std::path::Path;

/// スタック定義ファイルを読み込む
fn load_request(
    request: &Path,
    manifest: Option<&Path>,
    env: &[String],
) -> anyhow::Result<StackConfig> {
    let content = std::fs::read_to_string(request)
        .with_context(|| format!("定義ファイルを読み込めません: {}", request.display()))?;
    let mut config: StackConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("定義ファイルの形式が不正です: {}", request.display()))?;

    if let Some(path) = manifest {
        config.manifest_text = std::fs::read_to_string(path)
            .with_context(|| format!("マニフェストを読み込めません: {}", path.display()))?;
    }

    for entry in env {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("環境変数は KEY=VALUE 形式で指定してください: {}", entry))?;
        config
            .environment
            .insert(key.trim().to_string(), value.to_string());
    }

    Ok(config)
}

pub async fn create(
    manager: &StackManager,
    request: &Path,
    manifest: Option<&Path>,
    env: &[String],
    output: Output,
) -> anyhow::Result<()> {
    let config = load_request(request, manifest, env)?;

    output.progress(format!("スタック '{}' を作成中...", config.name).blue());
    let info = manager.create(&config).await?;

    if output.json {
        return output.print_json(&info);
    }
    println!("{}", "✓ スタックを作成しました".green().bold());
    print_stack(&info);
    Ok(())
}

fn target_label(name: &str, service: Option<&str>) -> String {
    match service {
        Some(service) => format!("{}/{}", name, service),
        None => name.to_string(),
    }
}

pub async fn start(manager: &StackManager, name: &str, service: Option<&str>) -> anyhow::Result<()> {
    println!("{} {}", "起動中:".blue(), target_label(name, service).cyan());
    manager.start(name, service).await?;
    println!("{}", "✓ 起動しました".green());
    Ok(())
}

pub async fn stop(manager: &StackManager, name: &str, service: Option<&str>) -> anyhow::Result<()> {
    println!("{} {}", "停止中:".blue(), target_label(name, service).cyan());
    manager.stop(name, service).await?;
    println!("{}", "✓ 停止しました".green());
    Ok(())
}

pub async fn restart(
    manager: &StackManager,
    name: &str,
    service: Option<&str>,
) -> anyhow::Result<()> {
    println!("{} {}", "再起動中:".blue(), target_label(name, service).cyan());
    manager.restart(name, service).await?;
    println!("{}", "✓ 再起動しました".green());
    Ok(())
}

pub async fn remove(manager: &StackManager, name: &str, volumes: bool) -> anyhow::Result<()> {
    println!("{} {}", "削除中:".blue(), name.cyan());
    if volumes {
        println!("  {}", "ボリュームも削除します".yellow());
    }
    manager.remove(name, volumes).await?;
    println!("{}", "✓ 削除しました".green());
    Ok(())
}

pub async fn update(manager: &StackManager, name: &str, output: Output) -> anyhow::Result<()> {
    output.progress(format_args!("{} {}", "更新中:".blue(), name.cyan()));
    let info = manager.update(name).await?;

    if output.json {
        return output.print_json(&info);
    }
    println!("{}", "✓ 最新イメージで再デプロイしました".green());
    print_stack(&info);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_request_merges_manifest_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let request = dir.path().join("blog.yaml");
        std::fs::write(
            &request,
            "name: blog\nvolume_ref: blog-data\nenvironment:\n  A: '1'\n",
        )
        .unwrap();
        let manifest = dir.path().join("docker-compose.yml");
        std::fs::write(&manifest, "services:\n  web:\n    image: nginx\n").unwrap();

        let config = load_request(
            &request,
            Some(&manifest),
            &["A=2".to_string(), "B=x=y".to_string()],
        )
        .unwrap();

        assert_eq!(config.name, "blog");
        assert!(config.manifest_text.contains("nginx"));
        assert_eq!(config.environment["A"], "2");
        assert_eq!(config.environment["B"], "x=y");
    }

    #[test]
    fn test_load_request_rejects_bad_env() {
        let dir = tempfile::tempdir().unwrap();
        let request = dir.path().join("blog.yaml");
        std::fs::write(&request, "name: blog\nmanifest_text: 'services: {}'\n").unwrap();

        assert!(load_request(&request, None, &["NOEQUALS".to_string()]).is_err());
    }
}
