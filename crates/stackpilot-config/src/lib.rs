pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// 設定ファイルパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "STACKPILOT_CONFIG_PATH";

/// スタックルートを上書きする環境変数
pub const STACKS_ROOT_ENV: &str = "STACKPILOT_STACKS_ROOT";

/// StackPilot の設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// スタックディレクトリを置くルート
    pub stacks_root: PathBuf,
    /// スタックディレクトリ内のマニフェストファイル名
    pub manifest_file_name: String,
    pub routing: RoutingSettings,
    /// compose CLI の起動コマンド（例: `docker compose`）
    pub compose_command: Vec<String>,
    /// `up` のタイムアウト（秒）
    pub up_timeout_secs: u64,
    /// その他の compose コマンドのタイムアウト（秒、未指定なら無制限）
    pub command_timeout_secs: Option<u64>,
    /// バインドマウント先を作成したときに割り当てる所有者
    pub volume_owner: VolumeOwner,
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoutingSettings {
    pub network: String,
    pub entrypoint: String,
    pub cert_resolver: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeOwner {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxySettings {
    pub container_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stacks_root: default_stacks_root(),
            manifest_file_name: "docker-compose.yml".to_string(),
            routing: RoutingSettings::default(),
            compose_command: vec!["docker".to_string(), "compose".to_string()],
            up_timeout_secs: 300,
            command_timeout_secs: None,
            volume_owner: VolumeOwner::default(),
            proxy: ProxySettings::default(),
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            network: "stackpilot-public".to_string(),
            entrypoint: "websecure".to_string(),
            cert_resolver: "letsencrypt".to_string(),
        }
    }
}

impl Default for VolumeOwner {
    fn default() -> Self {
        Self {
            uid: 1000,
            gid: 1000,
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            container_name: "stackpilot-proxy".to_string(),
        }
    }
}

impl Settings {
    pub fn up_timeout(&self) -> Duration {
        Duration::from_secs(self.up_timeout_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// YAML ファイルから読み込む
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// 設定ファイルを探して読み込み、環境変数の上書きを適用する
    ///
    /// 設定ファイルが無い場合は既定値を使います。
    pub fn load() -> Result<Self> {
        let mut settings = match find_settings_file()? {
            Some(path) => {
                debug!(path = %path.display(), "Loading settings file");
                Self::from_file(&path)?
            }
            None => {
                debug!("No settings file found, using defaults");
                Self::default()
            }
        };

        if let Ok(root) = std::env::var(STACKS_ROOT_ENV) {
            if !root.is_empty() {
                settings.stacks_root = PathBuf::from(root);
            }
        }

        Ok(settings)
    }
}

fn default_stacks_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("stackpilot")
        .join("stacks")
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 STACKPILOT_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stackpilot.yaml, .stackpilot.yaml
/// 3. ~/.config/stackpilot/config.yaml (グローバル設定)
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // 2. カレントディレクトリで検索
    let current_dir = std::env::current_dir()?;
    for filename in ["stackpilot.yaml", ".stackpilot.yaml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // 3. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackpilot").join("config.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}
