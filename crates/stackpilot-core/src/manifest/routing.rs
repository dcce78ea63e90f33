//! リバースプロキシ（Traefik）向けルーティングラベルの注入

use super::{RoutingOptions, child_mapping, ensure_mapping, scalar_to_string, service_names};
use crate::model::{ServiceRoute, StackConfig};
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

/// データベースと推定するサービス名の部分文字列
const DATABASE_HINTS: &[&str] = &["db", "database", "mysql", "postgres", "mongo"];

/// ルーティング先ポートの決定元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    /// routing_config の internal_port
    Explicit,
    /// ports の最初のコンテナ側ポート
    PortMapping,
    /// expose の最初の要素
    Expose,
    /// 呼び出し側の port（最終手段）
    Fallback,
}

pub fn is_database_service(name: &str) -> bool {
    let lower = name.to_lowercase();
    DATABASE_HINTS.iter().any(|hint| lower.contains(hint))
}

/// ラベル・ルーター名に使える形へ整形する
pub fn sanitize_label(value: &str) -> String {
    let mapped: String = value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    mapped.trim_matches('-').to_string()
}

pub fn router_name(subdomain: &str, service: &str) -> String {
    format!("{}-{}", sanitize_label(subdomain), service)
}

/// ルーティングラベルを各サービスに付与し、対象になったサービス数を返す
pub(crate) fn apply_routing(
    services: &mut Mapping,
    config: &StackConfig,
    options: &RoutingOptions,
) -> usize {
    if !config.use_routing {
        return 0;
    }
    let (Some(domain), Some(subdomain)) = (
        config.domain.as_deref().filter(|d| !d.is_empty()),
        config.subdomain.as_deref().filter(|s| !s.is_empty()),
    ) else {
        warn!("Routing requested without domain/subdomain, skipping routing labels");
        return 0;
    };

    let mut routed = 0;

    for name in service_names(services) {
        if name == "_main" {
            continue;
        }
        let route = config.routing_config.get(&name);

        if route.is_some_and(|r| !r.enabled) {
            debug!(service = %name, "Routing disabled for service");
            continue;
        }
        if route.is_none() && is_database_service(&name) {
            debug!(service = %name, "Skipping database-like service");
            continue;
        }

        let Some(service) = services.get_mut(name.as_str()) else {
            continue;
        };
        let service = ensure_mapping(service);

        let (port, source) = resolve_port(service, route, config.port);
        if source == PortSource::Fallback {
            warn!(
                service = %name,
                port,
                "No port declared for service, falling back to the allocated stack port"
            );
        }

        let router = router_name(subdomain, &name);
        let host = format!("{}.{}.{}", name, subdomain, domain);
        add_router_labels(service, &router, &host, port, options);
        attach_network(service, &options.network);
        routed += 1;
    }

    if let Some(main) = &config.routing_config.main {
        if let (Some(target), Some(port)) = (
            main.service_name.as_deref(),
            main.internal_port.filter(|p| *p > 0),
        ) {
            match services.get_mut(target) {
                Some(service) => {
                    let service = ensure_mapping(service);
                    let host = format!("{}.{}", subdomain, domain);
                    add_router_labels(service, &sanitize_label(subdomain), &host, port, options);
                    if attach_network(service, &options.network) {
                        routed += 1;
                    }
                }
                None => warn!(service = %target, "Main route targets an undeclared service"),
            }
        }
    }

    routed
}

/// ルーティング先ポートを優先順位に従って決める
///
/// 1. routing_config の internal_port (> 0)
/// 2. ports の最初のコンテナ側ポート
/// 3. expose の最初の要素
/// 4. 呼び出し側の port
pub(crate) fn resolve_port(
    service: &Mapping,
    route: Option<&ServiceRoute>,
    fallback: u16,
) -> (u16, PortSource) {
    if let Some(port) = route.and_then(|r| r.internal_port).filter(|p| *p > 0) {
        return (port, PortSource::Explicit);
    }

    if let Some(port) = service
        .get("ports")
        .and_then(Value::as_sequence)
        .and_then(|ports| ports.iter().find_map(container_port))
    {
        return (port, PortSource::PortMapping);
    }

    if let Some(port) = service
        .get("expose")
        .and_then(Value::as_sequence)
        .and_then(|expose| expose.first())
        .and_then(scalar_to_string)
        .and_then(|s| parse_port_token(&s))
    {
        return (port, PortSource::Expose);
    }

    (fallback, PortSource::Fallback)
}

/// ポート定義からコンテナ側ポートを取り出す
///
/// `"8080:80"`, `"127.0.0.1:8080:80/tcp"`, `80`, `{target: 80}`, `{container: 80}` に対応。
fn container_port(entry: &Value) -> Option<u16> {
    match entry {
        Value::Mapping(map) => map
            .get("target")
            .or_else(|| map.get("container"))
            .and_then(scalar_to_string)
            .and_then(|s| parse_port_token(&s)),
        other => {
            let text = scalar_to_string(other)?;
            let container_side = text.rsplit(':').next()?;
            parse_port_token(container_side)
        }
    }
}

/// `"80"`, `"80/tcp"`, `"3000-3005"` の先頭ポート
fn parse_port_token(token: &str) -> Option<u16> {
    let token = token.split('/').next()?;
    let token = token.split('-').next()?;
    token.trim().parse::<u16>().ok().filter(|p| *p > 0)
}

fn add_router_labels(
    service: &mut Mapping,
    router: &str,
    host: &str,
    port: u16,
    options: &RoutingOptions,
) {
    let labels = labels_mapping(service);
    let mut set = |key: String, value: String| {
        labels.insert(Value::String(key), Value::String(value));
    };

    set("traefik.enable".into(), "true".into());
    set("traefik.docker.network".into(), options.network.clone());
    set(
        format!("traefik.http.routers.{}.rule", router),
        format!("Host(`{}`)", host),
    );
    set(
        format!("traefik.http.routers.{}.entrypoints", router),
        options.entrypoint.clone(),
    );
    set(format!("traefik.http.routers.{}.tls", router), "true".into());
    set(
        format!("traefik.http.routers.{}.tls.certresolver", router),
        options.cert_resolver.clone(),
    );
    set(
        format!("traefik.http.routers.{}.service", router),
        router.to_string(),
    );
    set(
        format!("traefik.http.services.{}.loadbalancer.server.port", router),
        port.to_string(),
    );
}

/// サービスの labels をマッピング形式に正規化して返す
///
/// `=` を含まないラベルは値が空のラベルとして残します。
pub(crate) fn labels_mapping(service: &mut Mapping) -> &mut Mapping {
    if let Some(list) = service.get("labels").and_then(Value::as_sequence) {
        let mut normalized = Mapping::new();
        for entry in list.iter().filter_map(Value::as_str) {
            let (key, value) = entry.split_once('=').unwrap_or((entry, ""));
            let key = key.trim();
            if !key.is_empty() {
                normalized.insert(
                    Value::String(key.to_string()),
                    Value::String(value.to_string()),
                );
            }
        }
        service.insert(Value::String("labels".into()), Value::Mapping(normalized));
    }
    child_mapping(service, "labels")
}

/// ルーティングネットワークへ接続する。接続を追加した場合 true
fn attach_network(service: &mut Mapping, network: &str) -> bool {
    if service.contains_key("network_mode") {
        debug!("Service uses network_mode, not attaching routing network");
        return false;
    }

    let key = Value::String("networks".into());
    match service.get_mut("networks") {
        Some(Value::Sequence(list)) => {
            if !list.iter().any(|n| n.as_str() == Some(network)) {
                list.push(Value::String(network.to_string()));
            }
        }
        Some(Value::Mapping(map)) => {
            if !map.contains_key(network) {
                map.insert(Value::String(network.to_string()), Value::Null);
            }
        }
        _ => {
            // 未指定の場合はデフォルトネットワークを維持する
            service.insert(
                key,
                Value::Sequence(vec![
                    Value::String("default".into()),
                    Value::String(network.to_string()),
                ]),
            );
        }
    }
    true
}

/// トップレベルに外部ネットワークを宣言する（既存なら何もしない）
pub(crate) fn declare_external_network(document: &mut Mapping, network: &str) {
    let networks = child_mapping(document, "networks");
    if networks.contains_key(network) {
        return;
    }
    let mut definition = Mapping::new();
    definition.insert(Value::String("external".into()), Value::Bool(true));
    networks.insert(
        Value::String(network.to_string()),
        Value::Mapping(definition),
    );
}
