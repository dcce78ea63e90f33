//! スタックのライフサイクル管理
//!
//! スタックディレクトリとマニフェストファイルの存在が「スタックが存在する」ことの
//! 唯一の根拠です。作成・削除はこのディレクトリを所有し、それ以外の操作は
//! マニフェストを使って compose を呼び出します。

use crate::status::{StatusAggregator, member_prefix};
use indexmap::IndexMap;
use stackpilot_config::Settings;
use stackpilot_container::{
    ComposeRunner, ComposeTarget, ContainerError, ContainerRuntime, LogOptions, Ownership,
    VolumeTarget, prepare_volume,
};
use stackpilot_core::template::expand_placeholders;
use stackpilot_core::{
    ManifestTransformer, Result, RoutingOptions, ServiceMetrics, StackConfig, StackError,
    StackInfo, is_valid_stack_name,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// スタックのライフサイクル管理
#[derive(Clone)]
pub struct StackManager {
    settings: Settings,
    transformer: ManifestTransformer,
    runtime: Arc<dyn ContainerRuntime>,
    compose: Arc<dyn ComposeRunner>,
    aggregator: StatusAggregator,
}

impl StackManager {
    pub fn new(
        settings: Settings,
        runtime: Arc<dyn ContainerRuntime>,
        compose: Arc<dyn ComposeRunner>,
    ) -> Self {
        let transformer = ManifestTransformer::new(RoutingOptions {
            network: settings.routing.network.clone(),
            entrypoint: settings.routing.entrypoint.clone(),
            cert_resolver: settings.routing.cert_resolver.clone(),
        });
        let aggregator = StatusAggregator::new(runtime.clone());

        Self {
            settings,
            transformer,
            runtime,
            compose,
            aggregator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stack_dir(&self, name: &str) -> PathBuf {
        self.settings.stacks_root.join(name)
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.stack_dir(name).join(&self.settings.manifest_file_name)
    }

    fn target(&self, name: &str) -> ComposeTarget {
        ComposeTarget {
            dir: self.stack_dir(name),
            manifest: self.manifest_path(name),
            project: name.to_string(),
        }
    }

    /// スタックが存在するか（ディレクトリとマニフェストがあるか）
    pub fn exists(&self, name: &str) -> bool {
        self.manifest_path(name).is_file()
    }

    /// 存在するスタック名の一覧（名前順）
    pub fn list(&self) -> Result<Vec<String>> {
        list_stacks(&self.settings)
    }

    fn require_manifest(&self, name: &str) -> Result<ComposeTarget> {
        if !is_valid_stack_name(name) {
            return Err(StackError::Validation(format!(
                "スタック名 '{}' は使用できません",
                name
            )));
        }
        if !self.exists(name) {
            return Err(StackError::NotFound(format!("スタック '{}'", name)));
        }
        Ok(self.target(name))
    }

    /// スタックを作成して起動する
    ///
    /// デプロイに失敗した場合は削除をロールバックとして試み、元のエラーを返します。
    #[tracing::instrument(skip(self, config), fields(stack = %config.name))]
    pub async fn create(&self, config: &StackConfig) -> Result<StackInfo> {
        validate(config)?;

        let name = config.name.as_str();
        if self.exists(name) {
            return Err(StackError::Conflict(format!(
                "スタック '{}' は既に存在します",
                name
            )));
        }

        let dir = self.stack_dir(name);
        std::fs::create_dir_all(&dir).map_err(|e| StackError::io(&dir, e))?;

        // デプロイ前に失敗したら書きかけのディレクトリを残さない
        if let Err(e) = self.write_stack_files(config, &dir) {
            if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                warn!(
                    stack = %name,
                    dir = %dir.display(),
                    error = %cleanup,
                    "Failed to clean up stack directory"
                );
            }
            return Err(e);
        }

        if config.use_routing {
            let network = &self.settings.routing.network;
            if let Err(e) = self.runtime.ensure_network(network).await {
                warn!(network = %network, error = %e, "Failed to ensure routing network");
            }
        }

        self.prepare_volume(config).await;

        if let Err(e) = self.compose.up(&self.target(name), &config.environment).await {
            let failure = deployment_error(e);
            error!(stack = %name, error = %failure, "Stack deployment failed, rolling back");

            if let Err(rollback) = self.remove(name, false).await {
                error!(stack = %name, error = %rollback, "Rollback failed");
            }
            return Err(failure);
        }

        info!(stack = %name, "Stack deployed");

        match self.aggregator.status(name).await {
            Ok(info) => Ok(info),
            Err(e) => {
                warn!(stack = %name, error = %e, "Failed to read initial stack status");
                Ok(StackInfo::unknown(name))
            }
        }
    }

    /// 変換したマニフェストと補助ファイルをスタックディレクトリに書き出す
    fn write_stack_files(&self, config: &StackConfig, dir: &Path) -> Result<()> {
        let name = config.name.as_str();
        let output = self
            .transformer
            .transform(&config.manifest_text, config, dir)?;
        if !output.structured {
            warn!(stack = %name, "Manifest could not be parsed; deploying it unchanged");
        }

        let manifest_path = self.manifest_path(name);
        std::fs::write(&manifest_path, &output.manifest)
            .map_err(|e| StackError::io(&manifest_path, e))?;
        for side_file in &output.side_files {
            write_side_file(dir, &side_file.relative_path, &side_file.contents)?;
        }
        info!(
            stack = %name,
            side_files = output.side_files.len(),
            "Wrote stack manifest"
        );
        Ok(())
    }

    /// ボリューム（またはバインドパス）を事前に用意する。失敗は警告のみ
    async fn prepare_volume(&self, config: &StackConfig) {
        let reference = match &config.volume_path_template {
            Some(template) if !template.trim().is_empty() => {
                expand_placeholders(template, &config.environment)
            }
            _ => config.volume_ref.clone(),
        };

        let Some(target) = VolumeTarget::parse(&reference) else {
            debug!(stack = %config.name, "No volume to prepare");
            return;
        };

        let owner = Ownership {
            uid: self.settings.volume_owner.uid,
            gid: self.settings.volume_owner.gid,
        };
        match prepare_volume(self.runtime.as_ref(), &target, owner).await {
            Ok(outcome) => debug!(stack = %config.name, ?outcome, "Prepared volume"),
            Err(e) => warn!(stack = %config.name, error = %e, "Failed to prepare volume"),
        }
    }

    /// スタック全体、または指定サービスを起動する
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, name: &str, service: Option<&str>) -> Result<()> {
        let target = self.require_manifest(name)?;
        self.compose.start(&target, service).await?;
        info!(stack = %name, service = ?service, "Started");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn stop(&self, name: &str, service: Option<&str>) -> Result<()> {
        let target = self.require_manifest(name)?;
        self.compose.stop(&target, service).await?;
        info!(stack = %name, service = ?service, "Stopped");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn restart(&self, name: &str, service: Option<&str>) -> Result<()> {
        let target = self.require_manifest(name)?;
        self.compose.restart(&target, service).await?;
        info!(stack = %name, service = ?service, "Restarted");
        Ok(())
    }

    /// スタックを削除する
    ///
    /// マニフェストが無い、または `down` が失敗した場合は、名前のプレフィックスで
    /// 見つかったコンテナを直接停止・削除します。スタックディレクトリは常に削除します。
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, name: &str, remove_volumes: bool) -> Result<()> {
        if !is_valid_stack_name(name) {
            return Err(StackError::Validation(format!(
                "スタック名 '{}' は使用できません",
                name
            )));
        }

        let dir = self.stack_dir(name);
        let dir_exists = dir.exists();

        let mut removed_by_compose = false;
        if self.exists(name) {
            match self.compose.down(&self.target(name), remove_volumes).await {
                Ok(()) => removed_by_compose = true,
                Err(e) => warn!(
                    stack = %name,
                    error = %e,
                    "compose down failed, removing containers directly"
                ),
            }
        }

        let mut failure = None;
        let mut removed_containers = 0;
        if !removed_by_compose {
            match self.remove_members(name, remove_volumes).await {
                Ok(count) => removed_containers = count,
                Err(e) => failure = Some(e),
            }
        }

        if dir_exists {
            std::fs::remove_dir_all(&dir).map_err(|e| StackError::io(&dir, e))?;
            debug!(stack = %name, dir = %dir.display(), "Deleted stack directory");
        }

        if let Some(e) = failure {
            return Err(e);
        }
        if !dir_exists && !removed_by_compose && removed_containers == 0 {
            return Err(StackError::NotFound(format!("スタック '{}'", name)));
        }

        info!(stack = %name, remove_volumes, "Stack removed");
        Ok(())
    }

    /// プレフィックスで見つかったメンバーコンテナを直接削除し、件数を返す
    ///
    /// 1件の失敗で止めずに全件を試み、最初のエラーを返します。
    async fn remove_members(&self, name: &str, remove_volumes: bool) -> Result<usize> {
        let containers = self
            .runtime
            .list_containers_by_prefix(&member_prefix(name))
            .await?;

        let mut removed = 0;
        let mut first_error = None;
        for container in &containers {
            match self.runtime.stop_and_remove(container, remove_volumes).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(
                        stack = %name,
                        container = %container.name,
                        error = %e,
                        "Failed to remove member container"
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if removed > 0 {
            info!(stack = %name, count = removed, "Removed member containers");
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(removed),
        }
    }

    /// イメージを取得し直して再デプロイする（マニフェストは変更しない）
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, name: &str) -> Result<StackInfo> {
        let target = self.require_manifest(name)?;

        self.compose.pull(&target).await.map_err(deployment_error)?;
        self.compose
            .up(&target, &IndexMap::new())
            .await
            .map_err(deployment_error)?;

        info!(stack = %name, "Stack updated");
        self.aggregator.status(name).await
    }

    pub async fn logs(&self, name: &str, options: &LogOptions) -> Result<Vec<String>> {
        let target = self.require_manifest(name)?;
        Ok(self.compose.logs(&target, options).await?)
    }

    pub async fn status(&self, name: &str) -> Result<StackInfo> {
        self.aggregator.status(name).await
    }

    pub async fn metrics(&self, name: &str) -> Result<Vec<ServiceMetrics>> {
        self.aggregator.metrics(name).await
    }
}

/// スタックルート配下でマニフェストを持つディレクトリ名を列挙する
pub fn list_stacks(settings: &Settings) -> Result<Vec<String>> {
    let root = &settings.stacks_root;
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(root).map_err(|e| StackError::io(root, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StackError::io(root, e))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if is_valid_stack_name(&name)
            && entry.path().join(&settings.manifest_file_name).is_file()
        {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn validate(config: &StackConfig) -> Result<()> {
    if !is_valid_stack_name(&config.name) {
        return Err(StackError::Validation(format!(
            "スタック名 '{}' は使用できません（英小文字・数字・'-'、先頭は英数字、63文字以内）",
            config.name
        )));
    }
    if config.manifest_text.trim().is_empty() {
        return Err(StackError::Validation(
            "マニフェストが空です".to_string(),
        ));
    }
    if config.cpu_limit.is_some_and(|cpu| !cpu.is_finite() || cpu < 0.0) {
        return Err(StackError::Validation(
            "cpu_limit は 0 以上の数値で指定してください".to_string(),
        ));
    }
    Ok(())
}

/// `up` の失敗を分類する
///
/// ランタイムに接続できない場合と権限エラーはそのまま、それ以外は出力付きの Deployment エラー。
fn deployment_error(err: ContainerError) -> StackError {
    let output = err
        .command_output()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());

    match StackError::from(err) {
        e @ (StackError::ServiceUnavailable(_) | StackError::Permission(_)) => e,
        _ => StackError::deployment(output),
    }
}

fn write_side_file(dir: &Path, relative: &Path, contents: &str) -> Result<()> {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StackError::io(parent, e))?;
    }
    std::fs::write(&path, contents).map_err(|e| StackError::io(&path, e))?;
    debug!(path = %path.display(), "Wrote side file");
    Ok(())
}
