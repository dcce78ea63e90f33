//! サービス環境変数の正規化とマージ

use super::key_value_list_to_mapping;
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

/// `environment` をマッピング形式へ正規化し、呼び出し側の値で上書きマージする
pub(crate) fn normalize_and_merge(service: &mut Mapping, overrides: &IndexMap<String, String>) {
    let mut env = match service.get("environment") {
        Some(Value::Sequence(list)) => key_value_list_to_mapping(list),
        Some(Value::Mapping(map)) => map.clone(),
        _ => Mapping::new(),
    };

    for (key, value) in overrides {
        env.insert(Value::String(key.clone()), Value::String(value.clone()));
    }

    if env.is_empty() && !service.contains_key("environment") {
        return;
    }
    service.insert(Value::String("environment".into()), Value::Mapping(env));
}
