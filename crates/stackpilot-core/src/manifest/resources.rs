//! リソース制限の注入

use super::{child_mapping, routing::labels_mapping};
use crate::model::StackConfig;
use serde_yaml::{Mapping, Number, Value};

/// 参考値としてのストレージ上限を記録するラベル
pub const STORAGE_LIMIT_LABEL: &str = "stackpilot.storage.limit";

/// `deploy.resources` に CPU / メモリ制限を設定する
///
/// ストレージ上限は強制手段が無いため、ラベルとして記録するだけです。
pub(crate) fn apply_limits(service: &mut Mapping, config: &StackConfig) {
    let cpus = config.cpu_limit.filter(|c| *c > 0.0);
    let memory = non_empty(config.memory_limit.as_deref());
    let reservation = non_empty(config.memory_reservation.as_deref());

    if cpus.is_some() || memory.is_some() || reservation.is_some() {
        let resources = child_mapping(child_mapping(service, "deploy"), "resources");

        if cpus.is_some() || memory.is_some() {
            let limits = child_mapping(resources, "limits");
            if let Some(cpus) = cpus {
                limits.insert(
                    Value::String("cpus".into()),
                    Value::Number(Number::from(cpus)),
                );
            }
            if let Some(memory) = memory {
                limits.insert(
                    Value::String("memory".into()),
                    Value::String(memory.to_string()),
                );
            }
        }

        if let Some(reservation) = reservation {
            child_mapping(resources, "reservations").insert(
                Value::String("memory".into()),
                Value::String(reservation.to_string()),
            );
        }
    }

    if let Some(storage) = non_empty(config.storage_limit.as_deref()) {
        labels_mapping(service).insert(
            Value::String(STORAGE_LIMIT_LABEL.into()),
            Value::String(storage.to_string()),
        );
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
