//! スタック作成リクエスト

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// スタック作成の入力
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    /// スタック名（一意・ファイルシステム安全な識別子）
    pub name: String,

    /// 生のマニフェスト（compose YAML）
    #[serde(default)]
    pub manifest_text: String,

    /// 名前付きボリュームまたはホストの絶対パス
    #[serde(default)]
    pub volume_ref: String,

    /// `${VAR}` を含むボリュームパスのテンプレート
    #[serde(default)]
    pub volume_path_template: Option<String>,

    /// 環境変数（宣言順を保持）
    #[serde(default)]
    pub environment: IndexMap<String, String>,

    #[serde(default)]
    pub use_routing: bool,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub routing_config: RoutingConfig,

    #[serde(default)]
    pub cpu_limit: Option<f64>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub memory_reservation: Option<String>,
    /// 参考値のみ（強制しない）
    #[serde(default)]
    pub storage_limit: Option<String>,

    /// 外部に割り当てられたポート（ルーティング先の最終手段）
    #[serde(default)]
    pub port: u16,
}

/// サービスごとのルーティング指定
///
/// `_main` キーはトップレベルドメインのルーティング用に予約されています。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutingConfig {
    #[serde(rename = "_main", default, skip_serializing_if = "Option::is_none")]
    pub main: Option<MainRoute>,

    #[serde(flatten)]
    pub services: IndexMap<String, ServiceRoute>,
}

impl RoutingConfig {
    pub fn get(&self, service: &str) -> Option<&ServiceRoute> {
        self.services.get(service)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRoute {
    #[serde(default)]
    pub internal_port: Option<u16>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for ServiceRoute {
    fn default() -> Self {
        Self {
            internal_port: None,
            enabled: true,
        }
    }
}

/// `{subdomain}.{domain}` を受けるサービス
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MainRoute {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub internal_port: Option<u16>,
}

fn default_enabled() -> bool {
    true
}

/// スタック名として使えるか検証する
///
/// 英小文字・数字・`-` のみ、先頭は英数字、最大63文字。
/// メンバーコンテナは `{スタック名}_` で探すため、`_` は許可しない。
pub fn is_valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 63
        && (first.is_ascii_lowercase() || first.is_ascii_digit())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
