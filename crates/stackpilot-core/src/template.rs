//! `${VAR}` 形式の変数展開
//!
//! ボリュームパスのテンプレートをスタックの環境変数で解決します。
//! マニフェスト本体には適用しません（呼び出し側のテンプレートはそのまま compose に渡す）。

use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::warn;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid variable pattern")
});

/// テンプレート内の `${VAR}` を展開する
///
/// 未定義の変数はそのまま残し、警告を出します。
pub fn expand_placeholders(template: &str, variables: &IndexMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match variables.get(name) {
                Some(value) => value.clone(),
                None => {
                    warn!(variable = %name, "Unresolved placeholder left as-is");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// 未解決のプレースホルダーが残っているか
pub fn has_placeholders(value: &str) -> bool {
    VAR_PATTERN.is_match(value)
}
