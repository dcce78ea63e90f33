//! マニフェスト変換
//!
//! compose マニフェストを汎用 YAML ドキュメント（`serde_yaml::Value`）として読み込み、
//! ルーティングラベル・環境変数・リソース制限を各サービスへ注入して書き戻します。
//! サービス定義は利用者が自由に書くため、固定スキーマへのデシリアライズは行わず
//! 必要なパスだけを辿って書き換えます。

mod environment;
mod resources;
mod routing;

#[cfg(test)]
mod tests;

pub use resources::STORAGE_LIMIT_LABEL;
pub use routing::{PortSource, is_database_service, router_name, sanitize_label};

use crate::error::{Result, StackError};
use crate::model::StackConfig;
use crate::sidefile::{self, SideFile};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// リバースプロキシ側の設定
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingOptions {
    /// プロキシと共有する外部ネットワーク名
    pub network: String,
    pub entrypoint: String,
    pub cert_resolver: String,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            network: "stackpilot-public".to_string(),
            entrypoint: "websecure".to_string(),
            cert_resolver: "letsencrypt".to_string(),
        }
    }
}

/// 変換結果
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// 書き出すマニフェスト
    pub manifest: String,
    /// マニフェストと一緒に書き出す補助ファイル
    pub side_files: Vec<SideFile>,
    /// 構造化ドキュメントとして解釈できたか（false なら入力そのまま）
    pub structured: bool,
}

/// マニフェスト変換器
#[derive(Debug, Clone, Default)]
pub struct ManifestTransformer {
    routing: RoutingOptions,
}

impl ManifestTransformer {
    pub fn new(routing: RoutingOptions) -> Self {
        Self { routing }
    }

    pub fn routing(&self) -> &RoutingOptions {
        &self.routing
    }

    /// マニフェストを変換する
    ///
    /// YAML として解釈できない入力（未展開のテンプレート構文など）は警告のみで
    /// そのまま返します。`stack_dir` は既存の補助ファイルの確認に使います。
    #[tracing::instrument(skip(self, manifest_text, config), fields(stack = %config.name))]
    pub fn transform(
        &self,
        manifest_text: &str,
        config: &StackConfig,
        stack_dir: &Path,
    ) -> Result<TransformOutput> {
        let side_files = self.side_files(manifest_text, config, stack_dir);

        let mut document = match parse_document(manifest_text) {
            Some(doc) => doc,
            None => {
                return Ok(TransformOutput {
                    manifest: manifest_text.to_string(),
                    side_files,
                    structured: false,
                });
            }
        };

        let touched = self.apply(&mut document, config);
        debug!(routed_services = touched, "Applied manifest injections");

        let manifest = serde_yaml::to_string(&Value::Mapping(document))
            .map_err(|e| StackError::Manifest(e.to_string()))?;

        Ok(TransformOutput {
            manifest,
            side_files,
            structured: true,
        })
    }

    /// 解析済みドキュメントへ注入を行い、ルーティングを付けたサービス数を返す
    fn apply(&self, document: &mut Mapping, config: &StackConfig) -> usize {
        let routed = {
            let Some(services) = document.get_mut("services").and_then(Value::as_mapping_mut)
            else {
                return 0;
            };

            for name in service_names(services) {
                let Some(service) = services.get_mut(name.as_str()) else {
                    continue;
                };
                let service = ensure_mapping(service);
                environment::normalize_and_merge(service, &config.environment);
                resources::apply_limits(service, config);
            }

            routing::apply_routing(services, config, &self.routing)
        };

        if routed > 0 {
            routing::declare_external_network(document, &self.routing.network);
        }
        routed
    }

    fn side_files(
        &self,
        manifest_text: &str,
        config: &StackConfig,
        stack_dir: &Path,
    ) -> Vec<SideFile> {
        let mut files = Vec::new();

        if let Some(relative) = gateway_config_reference(manifest_text) {
            if stack_dir.join(&relative).exists() {
                debug!(path = %relative.display(), "Gateway config already present");
            } else {
                info!(path = %relative.display(), "Emitting default gateway config");
                files.push(SideFile::new(
                    relative,
                    sidefile::default_gateway_config(&config.environment),
                ));
            }
        }

        if !config.environment.is_empty() {
            files.push(SideFile::new(
                sidefile::DOTENV_FILE_NAME,
                sidefile::render_dotenv(&config.environment),
            ));
        }

        files
    }
}

/// YAML マッピングとして解析する。失敗時は警告を出して None
fn parse_document(manifest_text: &str) -> Option<Mapping> {
    match serde_yaml::from_str::<Value>(manifest_text) {
        Ok(Value::Mapping(map)) => Some(map),
        Ok(other) => {
            warn!(
                kind = value_kind(&other),
                "Manifest is not a mapping, using raw manifest"
            );
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to parse manifest, using raw manifest");
            None
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

static GATEWAY_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_./-]*kong\.yml").expect("valid gateway reference pattern")
});

/// マニフェストが参照するゲートウェイ設定の相対パスを探す
///
/// 絶対パスやスタックディレクトリ外を指す参照は対象外です。
fn gateway_config_reference(manifest_text: &str) -> Option<PathBuf> {
    let found = GATEWAY_REF.find(manifest_text)?.as_str();
    let path = Path::new(found);

    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }

    let relative: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    if relative.as_os_str().is_empty() {
        return Some(PathBuf::from(sidefile::GATEWAY_CONFIG_FILE_NAME));
    }
    Some(relative)
}

pub(crate) fn service_names(services: &Mapping) -> Vec<String> {
    services
        .keys()
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect()
}

/// 値をマッピングとして扱う。null などはマッピングに置き換える
pub(crate) fn ensure_mapping(value: &mut Value) -> &mut Mapping {
    if !value.is_mapping() {
        *value = Value::Mapping(Mapping::new());
    }
    match value {
        Value::Mapping(map) => map,
        _ => unreachable!("value was just replaced with a mapping"),
    }
}

/// `parent[key]` をマッピングとして取得（無ければ作成）
pub(crate) fn child_mapping<'a>(parent: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    let entry = parent
        .entry(Value::String(key.to_string()))
        .or_insert(Value::Null);
    ensure_mapping(entry)
}

/// `KEY=VALUE` 形式のリストをマッピングへ。該当しない要素は捨てる
pub(crate) fn key_value_list_to_mapping(list: &[Value]) -> Mapping {
    let mut map = Mapping::new();
    for item in list {
        let Some(entry) = item.as_str() else {
            continue;
        };
        if let Some((key, value)) = entry.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                map.insert(
                    Value::String(key.to_string()),
                    Value::String(value.to_string()),
                );
            }
        }
    }
    map
}

/// 文字列・数値・真偽値を文字列として読む
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
