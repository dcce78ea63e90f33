//! コンテナランタイムの抽象
//!
//! ライフサイクル管理と状態集計はこのトレイト越しにランタイムを操作します。

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// コンテナへの参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    /// 先頭の `/` を除いたコンテナ名
    pub name: String,
}

impl ContainerRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// 表示用に短縮したID
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

/// コンテナの状態
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerState {
    pub running: bool,
    /// ランタイムが報告する状態文字列（running, exited など）
    pub status: String,
    /// ヘルスチェックの状態（未設定なら None）
    pub health: Option<String>,
    /// 明示的に設定されたメモリ上限（バイト）。未設定なら None
    pub memory_limit: Option<u64>,
}

impl ContainerState {
    /// 起動中で、ヘルスチェックが無いか healthy なら準備完了
    pub fn is_ready(&self) -> bool {
        self.running
            && self
                .health
                .as_deref()
                .is_none_or(|h| h.eq_ignore_ascii_case("healthy"))
    }
}

/// 1回分の統計値（現在値と前回値）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStats {
    pub cpu_total: u64,
    pub system_cpu: u64,
    pub precpu_total: u64,
    pub presystem_cpu: u64,
    pub online_cpus: u32,
    pub memory_usage: u64,
    pub network_rx: u64,
    pub network_tx: u64,
}

/// ボリューム準備の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeOutcome {
    Created,
    AlreadyExists,
}

/// 再作成のために取り出したコンテナ設定
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub args: Vec<String>,
    pub labels: HashMap<String, String>,
    pub env: Vec<String>,
    pub binds: Vec<String>,
    /// (ホスト側, コンテナ側)
    pub ports: Vec<(u16, u16)>,
    pub network: Option<String>,
}

/// コンテナランタイムのトレイト
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// 名前が `prefix` で始まるコンテナを停止中のものも含めて列挙する
    async fn list_containers_by_prefix(&self, prefix: &str) -> Result<Vec<ContainerRef>>;

    async fn inspect(&self, container: &ContainerRef) -> Result<ContainerState>;

    async fn stats(&self, container: &ContainerRef) -> Result<RawStats>;

    /// 停止して削除する（`remove_volumes` で匿名ボリュームも削除）
    async fn stop_and_remove(&self, container: &ContainerRef, remove_volumes: bool)
    -> Result<()>;

    /// 名前付きボリュームを作成する。既存なら何もしない
    async fn ensure_volume(&self, name: &str) -> Result<VolumeOutcome>;

    /// ネットワークを作成する。既存なら何もしない
    async fn ensure_network(&self, name: &str) -> Result<()>;

    /// 既存コンテナの設定を取り出す。存在しなければ None
    async fn inspect_spec(&self, name: &str) -> Result<Option<ContainerSpec>>;

    /// 設定からコンテナを作成して起動し、IDを返す
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String>;
}
