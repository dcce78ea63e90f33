//! マニフェストと一緒に書き出す補助ファイル（.env、ゲートウェイ設定）

use indexmap::IndexMap;
use std::path::PathBuf;

/// dotenv ファイル名
pub const DOTENV_FILE_NAME: &str = ".env";

/// 既知テンプレートが参照するゲートウェイ設定ファイル名
pub const GATEWAY_CONFIG_FILE_NAME: &str = "kong.yml";

/// スタックディレクトリからの相対パスと内容
#[derive(Debug, Clone, PartialEq)]
pub struct SideFile {
    pub relative_path: PathBuf,
    pub contents: String,
}

impl SideFile {
    pub fn new(relative_path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: contents.into(),
        }
    }
}

/// 環境変数を dotenv 形式で出力する
///
/// 空白・クォート・`$` を含む値はダブルクォートで囲み、内部のクォートをエスケープします。
pub fn render_dotenv(environment: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in environment {
        out.push_str(key);
        out.push('=');
        out.push_str(&quote_dotenv_value(value));
        out.push('\n');
    }
    out
}

fn quote_dotenv_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || c == '"' || c == '\'' || c == '$');

    if !needs_quotes {
        return value.to_string();
    }

    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// ゲートウェイ上流ルート（パスプレフィックス → 上流URL）
const GATEWAY_ROUTES: &[(&str, &str, &str)] = &[
    ("auth-v1", "/auth/v1/", "http://auth:9999/"),
    ("rest-v1", "/rest/v1/", "http://rest:3000/"),
    ("graphql-v1", "/graphql/v1", "http://rest:3000/rpc/graphql"),
    ("realtime-v1", "/realtime/v1/", "http://realtime:4000/socket/"),
    ("storage-v1", "/storage/v1/", "http://storage:5000/"),
    ("functions-v1", "/functions/v1/", "http://functions:9000/"),
    ("meta", "/pg/", "http://meta:8080/"),
];

/// 既定のゲートウェイ設定を生成する
///
/// anon / service_role の2コンシューマーに API キー認証を許可します。
/// キーは環境変数 `ANON_KEY` / `SERVICE_ROLE_KEY` から取り、無ければ compose 側の
/// 置換に任せるため `${...}` のまま残します。
pub fn default_gateway_config(environment: &IndexMap<String, String>) -> String {
    let anon_key = environment
        .get("ANON_KEY")
        .cloned()
        .unwrap_or_else(|| "${ANON_KEY}".to_string());
    let service_key = environment
        .get("SERVICE_ROLE_KEY")
        .cloned()
        .unwrap_or_else(|| "${SERVICE_ROLE_KEY}".to_string());

    let mut out = String::from("_format_version: \"2.1\"\n_transform: true\n\nconsumers:\n");
    out.push_str("  - username: anon\n    keyauth_credentials:\n");
    out.push_str(&format!("      - key: \"{}\"\n", anon_key));
    out.push_str("  - username: service_role\n    keyauth_credentials:\n");
    out.push_str(&format!("      - key: \"{}\"\n", service_key));

    out.push_str("\nacls:\n");
    out.push_str("  - consumer: anon\n    group: anon\n");
    out.push_str("  - consumer: service_role\n    group: admin\n");

    out.push_str("\nservices:\n");
    for (name, path, upstream) in GATEWAY_ROUTES {
        out.push_str(&format!("  - name: {}\n", name));
        out.push_str(&format!("    url: {}\n", upstream));
        out.push_str("    routes:\n");
        out.push_str(&format!("      - name: {}-all\n", name));
        out.push_str("        strip_path: true\n");
        out.push_str(&format!("        paths:\n          - {}\n", path));
        out.push_str("    plugins:\n");
        out.push_str("      - name: cors\n");
        out.push_str("      - name: key-auth\n        config:\n          hide_credentials: false\n");
        out.push_str("      - name: acl\n        config:\n          hide_groups_header: true\n");
        out.push_str("          allow:\n            - admin\n            - anon\n");
    }

    out
}
