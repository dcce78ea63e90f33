use colored::Colorize;
use stackpilot::StackManager;
use stackpilot_container::LogOptions;

pub async fn handle(
    manager: &StackManager,
    name: &str,
    service: Option<String>,
    lines: usize,
) -> anyhow::Result<()> {
    let options = LogOptions {
        lines: Some(lines),
        service,
    };

    let logs = manager.logs(name, &options).await?;
    if logs.is_empty() {
        println!("{}", "ログはありません".dimmed());
        return Ok(());
    }

    // compose のログは "サービス | 本文" の形式
    let colors = [
        colored::Color::Cyan,
        colored::Color::Green,
        colored::Color::Yellow,
        colored::Color::Magenta,
        colored::Color::Blue,
    ];
    let mut seen: Vec<String> = Vec::new();

    for line in logs {
        match line.split_once(" | ") {
            Some((prefix, body)) => {
                let key = prefix.trim().to_string();
                let idx = match seen.iter().position(|s| *s == key) {
                    Some(idx) => idx,
                    None => {
                        seen.push(key);
                        seen.len() - 1
                    }
                };
                println!("{} | {}", prefix.color(colors[idx % colors.len()]), body);
            }
            None => println!("{}", line),
        }
    }
    Ok(())
}
