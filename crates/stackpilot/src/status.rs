//! スタック状態とメトリクスの集計
//!
//! メンバーコンテナは `{スタック名}_` で始まる名前で識別します。
//! コンテナごとの問い合わせは並行に行い、1件の失敗で全体を失敗させません。

use futures_util::future::join_all;
use stackpilot_container::{ContainerRef, ContainerRuntime, to_service_metrics};
use stackpilot_core::{Result, ServiceInfo, ServiceMetrics, ServiceState, StackInfo};
use std::sync::Arc;
use tracing::{debug, warn};

/// メンバーコンテナ名のプレフィックス
pub fn member_prefix(stack: &str) -> String {
    format!("{}_", stack)
}

/// コンテナ名からサービス名を導出する
///
/// `blog_web_1` → `web`（スタック名のプレフィックスと末尾の連番を除去）
pub fn service_name(stack: &str, container_name: &str) -> String {
    let name = container_name.trim_start_matches('/');
    let name = name.strip_prefix(&member_prefix(stack)).unwrap_or(name);

    match name.rsplit_once('_') {
        Some((base, ordinal))
            if !base.is_empty()
                && !ordinal.is_empty()
                && ordinal.chars().all(|c| c.is_ascii_digit()) =>
        {
            base.to_string()
        }
        _ => name.to_string(),
    }
}

/// 状態・メトリクス集計
#[derive(Clone)]
pub struct StatusAggregator {
    runtime: Arc<dyn ContainerRuntime>,
}

impl StatusAggregator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    async fn members(&self, stack: &str) -> Result<Vec<ContainerRef>> {
        Ok(self
            .runtime
            .list_containers_by_prefix(&member_prefix(stack))
            .await?)
    }

    /// スタックの状態を取得する
    pub async fn status(&self, stack: &str) -> Result<StackInfo> {
        let containers = self.members(stack).await?;
        if containers.is_empty() {
            debug!(stack = %stack, "No member containers");
            return Ok(StackInfo::from_services(stack, Vec::new()));
        }

        let services = join_all(
            containers
                .iter()
                .map(|container| self.service_info(stack, container)),
        )
        .await;

        Ok(StackInfo::from_services(stack, services))
    }

    async fn service_info(&self, stack: &str, container: &ContainerRef) -> ServiceInfo {
        match self.runtime.inspect(container).await {
            Ok(state) => ServiceInfo {
                name: service_name(stack, &container.name),
                status: if state.running {
                    ServiceState::Running
                } else {
                    ServiceState::Stopped
                },
                ready: state.is_ready(),
            },
            Err(e) => {
                warn!(
                    stack = %stack,
                    container = %container.name,
                    error = %e,
                    "Failed to inspect container"
                );
                ServiceInfo {
                    name: container.short_id().to_string(),
                    status: ServiceState::Error,
                    ready: false,
                }
            }
        }
    }

    /// サービスごとのメトリクスを取得する
    pub async fn metrics(&self, stack: &str) -> Result<Vec<ServiceMetrics>> {
        let containers = self.members(stack).await?;

        let metrics = join_all(
            containers
                .iter()
                .map(|container| self.service_metrics(stack, container)),
        )
        .await;

        Ok(metrics)
    }

    async fn service_metrics(&self, stack: &str, container: &ContainerRef) -> ServiceMetrics {
        let name = service_name(stack, &container.name);

        let (stats, state) = futures_util::join!(
            self.runtime.stats(container),
            self.runtime.inspect(container)
        );

        let stats = match stats {
            Ok(stats) => stats,
            Err(e) => {
                warn!(
                    stack = %stack,
                    container = %container.name,
                    error = %e,
                    "Failed to read container stats"
                );
                return ServiceMetrics::zeroed(name);
            }
        };

        // 上限が読めなければ無制限として扱う
        let configured_limit = state.ok().and_then(|s| s.memory_limit);
        to_service_metrics(name, &stats, configured_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_strips_prefix_and_ordinal() {
        assert_eq!(service_name("blog", "blog_web_1"), "web");
        assert_eq!(service_name("blog", "/blog_web_12"), "web");
        assert_eq!(service_name("blog", "blog_db_replica_2"), "db_replica");
    }

    #[test]
    fn test_service_name_without_ordinal() {
        assert_eq!(service_name("blog", "blog_web"), "web");
        assert_eq!(service_name("blog", "blog_web_v2"), "web_v2");
    }

    #[test]
    fn test_member_prefix() {
        assert_eq!(member_prefix("blog"), "blog_");
    }
}
