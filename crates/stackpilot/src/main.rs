mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackpilot")]
#[command(version)]
#[command(about = "compose スタックを作成・管理し、リバースプロキシの背後に公開する", long_about = None)]
struct Cli {
    /// 結果を JSON で出力
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スタックを作成して起動
    Create {
        /// スタック定義ファイル（YAML）
        request: PathBuf,
        /// マニフェストファイル（定義ファイルの manifest_text を置き換える）
        #[arg(short = 'f', long)]
        manifest: Option<PathBuf>,
        /// 環境変数（KEY=VALUE、複数指定可）
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
    },
    /// スタックを起動
    Start {
        name: String,
        /// サービス名（指定しない場合は全サービス）
        #[arg(short = 'n', long)]
        service: Option<String>,
    },
    /// スタックを停止
    Stop {
        name: String,
        /// サービス名（指定しない場合は全サービス）
        #[arg(short = 'n', long)]
        service: Option<String>,
    },
    /// スタックを再起動
    Restart {
        name: String,
        /// サービス名（指定しない場合は全サービス）
        #[arg(short = 'n', long)]
        service: Option<String>,
    },
    /// スタックを削除
    Remove {
        name: String,
        /// ボリュームも削除する
        #[arg(short, long)]
        volumes: bool,
    },
    /// 最新イメージで再デプロイ
    Update { name: String },
    /// スタックの状態を表示（省略時は全スタック）
    Status { names: Vec<String> },
    /// サービスごとのリソース使用量を表示（省略時は全スタック）
    Metrics { names: Vec<String> },
    /// ログを表示
    Logs {
        name: String,
        /// サービス名（指定しない場合は全サービス）
        #[arg(short = 'n', long)]
        service: Option<String>,
        /// ログの行数を指定
        #[arg(short = 'l', long, default_value = "100")]
        lines: usize,
    },
    /// スタックの一覧を表示
    List,
    /// リバースプロキシの操作
    Proxy {
        #[command(subcommand)]
        command: ProxyCommands,
    },
}

#[derive(Subcommand)]
enum ProxyCommands {
    /// ダッシュボードの有効・無効を切り替える
    Dashboard {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// 稼働中のプロキシ設定を表示
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = stackpilot_config::Settings::load()?;
    let output = commands::Output { json: cli.json };

    match cli.command {
        Commands::List => commands::status::list(&settings, output),
        Commands::Create {
            request,
            manifest,
            env,
        } => {
            let manager = commands::connect(&settings).await?;
            commands::stack::create(&manager, &request, manifest.as_deref(), &env, output).await
        }
        Commands::Start { name, service } => {
            let manager = commands::connect(&settings).await?;
            commands::stack::start(&manager, &name, service.as_deref()).await
        }
        Commands::Stop { name, service } => {
            let manager = commands::connect(&settings).await?;
            commands::stack::stop(&manager, &name, service.as_deref()).await
        }
        Commands::Restart { name, service } => {
            let manager = commands::connect(&settings).await?;
            commands::stack::restart(&manager, &name, service.as_deref()).await
        }
        Commands::Remove { name, volumes } => {
            let manager = commands::connect(&settings).await?;
            commands::stack::remove(&manager, &name, volumes).await
        }
        Commands::Update { name } => {
            let manager = commands::connect(&settings).await?;
            commands::stack::update(&manager, &name, output).await
        }
        Commands::Status { names } => {
            let manager = commands::connect(&settings).await?;
            commands::status::status(&manager, names, output).await
        }
        Commands::Metrics { names } => {
            let manager = commands::connect(&settings).await?;
            commands::status::metrics(&manager, names, output).await
        }
        Commands::Logs {
            name,
            service,
            lines,
        } => {
            let manager = commands::connect(&settings).await?;
            commands::logs::handle(&manager, &name, service, lines).await
        }
        Commands::Proxy { command } => {
            let runtime = commands::connect_runtime().await?;
            let proxy = stackpilot::ProxyManager::new(runtime, &settings.proxy.container_name);
            match command {
                ProxyCommands::Dashboard { state } => {
                    commands::proxy::dashboard(&proxy, matches!(state, Toggle::On), output).await
                }
                ProxyCommands::Show => commands::proxy::show(&proxy, output).await,
            }
        }
    }
}
