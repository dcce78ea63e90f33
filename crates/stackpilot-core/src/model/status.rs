//! ランタイムから再構成されるスタック状態とメトリクス

use serde::{Deserialize, Serialize};

/// スタック全体の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackStatus {
    Running,
    Partial,
    Stopped,
    Unknown,
}

impl StackStatus {
    /// サービス状態からスタック状態を導出する
    pub fn from_services(services: &[ServiceInfo]) -> Self {
        let running = services
            .iter()
            .filter(|s| s.status == ServiceState::Running)
            .count();

        if !services.is_empty() && running == services.len() {
            StackStatus::Running
        } else if running > 0 {
            StackStatus::Partial
        } else {
            StackStatus::Stopped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Partial => "partial",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// サービス（メンバーコンテナ）の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
    Error,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub status: ServiceState,
    pub ready: bool,
}

/// スタック情報（永続化されず、常にランタイムから導出）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInfo {
    pub name: String,
    pub status: StackStatus,
    pub services: Vec<ServiceInfo>,
}

impl StackInfo {
    pub fn from_services(name: impl Into<String>, services: Vec<ServiceInfo>) -> Self {
        Self {
            name: name.into(),
            status: StackStatus::from_services(&services),
            services,
        }
    }

    /// 状態取得に失敗した場合の縮退表現
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StackStatus::Unknown,
            services: Vec::new(),
        }
    }
}

/// サービスごとのリソースメトリクス
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_used: u64,
    /// 0 は無制限
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
}

impl ServiceMetrics {
    /// 取得失敗時のゼロ値
    pub fn zeroed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
