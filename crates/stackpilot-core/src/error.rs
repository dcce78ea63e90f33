use std::path::PathBuf;
use thiserror::Error;

/// デプロイ失敗の詳細分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentFailure {
    /// 分類できない失敗
    Generic,
    /// ホスト側ポートの競合
    PortConflict,
    /// イメージ取得時などの名前解決失敗
    DnsResolution,
}

impl DeploymentFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::PortConflict => "port-conflict",
            Self::DnsResolution => "dns-resolution",
        }
    }
}

#[derive(Error, Debug)]
pub enum StackError {
    #[error("入力が不正です: {0}")]
    Validation(String),

    #[error("見つかりません: {0}")]
    NotFound(String),

    #[error("競合が発生しました: {0}")]
    Conflict(String),

    #[error("権限がありません: {0}")]
    Permission(String),

    #[error(
        "コンテナランタイムに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください"
    )]
    ServiceUnavailable(String),

    #[error("デプロイに失敗しました ({}):\n{output}", kind.as_str())]
    Deployment {
        kind: DeploymentFailure,
        output: String,
    },

    #[error("ランタイムエラー: {0}")]
    Runtime(String),

    #[error("マニフェストエラー: {0}")]
    Manifest(String),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),
}

const PORT_CONFLICT_PATTERNS: &[&str] = &[
    "port is already allocated",
    "address already in use",
    "ports are not available",
];

const DNS_PATTERNS: &[&str] = &[
    "no such host",
    "could not resolve host",
    "temporary failure in name resolution",
    "server misbehaving",
];

impl StackError {
    /// `up` の出力を分類して Deployment エラーを作る
    pub fn deployment(output: impl Into<String>) -> Self {
        let output = output.into();
        let lower = output.to_lowercase();

        let kind = if PORT_CONFLICT_PATTERNS.iter().any(|p| lower.contains(p)) {
            DeploymentFailure::PortConflict
        } else if DNS_PATTERNS.iter().any(|p| lower.contains(p)) {
            DeploymentFailure::DnsResolution
        } else {
            DeploymentFailure::Generic
        };

        StackError::Deployment { kind, output }
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return StackError::Permission(format!("{}: {}", path.display(), err));
        }
        StackError::IoError {
            path,
            message: err.to_string(),
        }
    }

    /// 外部向けのエラー種別名
    pub fn kind(&self) -> &'static str {
        match self {
            StackError::Validation(_) => "validation",
            StackError::NotFound(_) => "not_found",
            StackError::Conflict(_) => "conflict",
            StackError::Permission(_) => "permission",
            StackError::ServiceUnavailable(_) => "service_unavailable",
            StackError::Deployment { .. } => "deployment",
            StackError::Runtime(_) | StackError::Manifest(_) => "internal",
            StackError::IoError { .. } | StackError::Io(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
