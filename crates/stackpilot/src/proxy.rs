//! リバースプロキシ（Traefik）コンテナの再作成
//!
//! 稼働中のプロキシコンテナから設定を読み取ってスナップショットを作り、
//! 1項目だけ変更して作り直します。読み取りは起動引数とラベルに対する正規表現で、
//! 一致しない項目は `None` になります。

use regex::Regex;
use stackpilot_container::{ContainerRef, ContainerRuntime, ContainerSpec};
use stackpilot_core::{Result, StackError};
use std::sync::{Arc, LazyLock};
use tracing::{error, info};

static ACME_EMAIL_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^--certificatesresolvers\.[^.=]+\.acme\.email=(\S+)$").expect("valid regex")
});

static DASHBOARD_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--api\.dashboard=(true|false)$").expect("valid regex"));

static DASHBOARD_RULE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^traefik\.http\.routers\.[^.]*dashboard[^.]*\.rule$").expect("valid regex")
});

static HOST_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Host\(`([^`]+)`\)").expect("valid regex"));

/// 稼働中のプロキシから読み取った設定
#[derive(Debug, Clone, PartialEq)]
pub struct ProxySnapshot {
    /// 作り直しに使う元のコンテナ設定
    pub spec: ContainerSpec,
    pub acme_email: Option<String>,
    pub dashboard_domain: Option<String>,
    pub dashboard_enabled: bool,
}

impl ProxySnapshot {
    pub fn capture(spec: ContainerSpec) -> Self {
        let acme_email = spec
            .args
            .iter()
            .find_map(|arg| ACME_EMAIL_ARG.captures(arg))
            .map(|c| c[1].to_string());

        let dashboard_enabled = spec
            .args
            .iter()
            .find_map(|arg| DASHBOARD_ARG.captures(arg))
            .is_some_and(|c| &c[1] == "true");

        let mut rule_labels: Vec<(&String, &String)> = spec
            .labels
            .iter()
            .filter(|(key, _)| DASHBOARD_RULE_LABEL.is_match(key))
            .collect();
        rule_labels.sort();
        let dashboard_domain = rule_labels
            .into_iter()
            .find_map(|(_, value)| HOST_RULE.captures(value))
            .map(|c| c[1].to_string());

        Self {
            spec,
            acme_email,
            dashboard_domain,
            dashboard_enabled,
        }
    }

    /// スナップショットからコンテナ設定を組み立てる
    pub fn to_spec(&self) -> ContainerSpec {
        let mut spec = self.spec.clone();

        spec.args.retain(|arg| !DASHBOARD_ARG.is_match(arg));
        spec.args
            .push(format!("--api.dashboard={}", self.dashboard_enabled));

        if let Some(email) = &self.acme_email {
            for arg in spec.args.iter_mut() {
                if let Some(c) = ACME_EMAIL_ARG.captures(arg) {
                    let current = c[1].to_string();
                    *arg = arg.replace(&current, email);
                }
            }
        }

        if let Some(domain) = &self.dashboard_domain {
            for (key, value) in spec.labels.iter_mut() {
                if DASHBOARD_RULE_LABEL.is_match(key) {
                    *value = format!("Host(`{}`)", domain);
                }
            }
        }

        spec
    }
}

/// プロキシコンテナの管理
pub struct ProxyManager {
    runtime: Arc<dyn ContainerRuntime>,
    container_name: String,
}

impl ProxyManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, container_name: impl Into<String>) -> Self {
        Self {
            runtime,
            container_name: container_name.into(),
        }
    }

    pub async fn snapshot(&self) -> Result<ProxySnapshot> {
        let spec = self
            .runtime
            .inspect_spec(&self.container_name)
            .await?
            .ok_or_else(|| {
                StackError::NotFound(format!("プロキシコンテナ '{}'", self.container_name))
            })?;
        Ok(ProxySnapshot::capture(spec))
    }

    /// ダッシュボードの有効・無効を切り替えてプロキシを作り直す
    #[tracing::instrument(skip(self), fields(container = %self.container_name))]
    pub async fn set_dashboard(&self, enabled: bool) -> Result<ProxySnapshot> {
        let mut snapshot = self.snapshot().await?;
        if snapshot.dashboard_enabled == enabled {
            info!(enabled, "Dashboard already in requested state");
            return Ok(snapshot);
        }
        snapshot.dashboard_enabled = enabled;
        let spec = snapshot.to_spec();

        let current = self
            .runtime
            .list_containers_by_prefix(&self.container_name)
            .await?
            .into_iter()
            .find(|c| c.name == self.container_name)
            .unwrap_or_else(|| ContainerRef::new(&self.container_name, &self.container_name));

        self.runtime.stop_and_remove(&current, false).await?;

        if let Err(e) = self.runtime.run_container(&spec).await {
            error!(error = %e, "Failed to recreate proxy container");
            return Err(e.into());
        }

        info!(enabled, "Recreated proxy container");
        Ok(ProxySnapshot::capture(spec))
    }
}
