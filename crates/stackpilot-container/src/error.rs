use stackpilot_core::StackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • docker ps コマンドが正常に動作するか確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("コンテナ '{container}' が見つかりません")]
    ContainerNotFound { container: String },

    #[error("リソースが競合しています: {0}")]
    Conflict(String),

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error("コマンドが失敗しました: {command}\n{output}")]
    CommandFailed { command: String, output: String },

    #[error("コマンドがタイムアウトしました（{secs}秒）: {command}\n{output}")]
    CommandTimeout {
        command: String,
        secs: u64,
        output: String,
    },

    #[error("権限がありません: {0}")]
    PermissionDenied(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// コマンドの失敗出力（タイムアウト含む）
    pub fn command_output(&self) -> Option<&str> {
        match self {
            ContainerError::CommandFailed { output, .. }
            | ContainerError::CommandTimeout { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => ContainerError::ContainerNotFound {
                container: message.clone(),
            },
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => ContainerError::Conflict(message.clone()),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 403,
                message,
            } => ContainerError::PermissionDenied(message.clone()),
            _ => {
                // 接続エラーの可能性をチェック
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else if err_str.contains("Permission denied") {
                    ContainerError::PermissionDenied(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

/// compose の出力からランタイム未接続を判定する
fn looks_unreachable(output: &str) -> bool {
    output.contains("Cannot connect to the Docker daemon")
        || output.contains("Is the docker daemon running")
}

impl From<ContainerError> for StackError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::DockerConnectionFailed(msg) => StackError::ServiceUnavailable(msg),
            ContainerError::ContainerNotFound { container } => StackError::NotFound(container),
            ContainerError::Conflict(msg) => StackError::Conflict(msg),
            ContainerError::PermissionDenied(msg) => StackError::Permission(msg),
            ContainerError::DockerApiError(msg) => StackError::Runtime(msg),
            ContainerError::CommandFailed { command, output }
            | ContainerError::CommandTimeout {
                command, output, ..
            } => {
                if looks_unreachable(&output) {
                    StackError::ServiceUnavailable(output)
                } else if output.to_lowercase().contains("permission denied") {
                    StackError::Permission(output)
                } else {
                    StackError::Runtime(format!("{}\n{}", command, output))
                }
            }
            ContainerError::Io(e) => StackError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
