#![allow(dead_code)]

use async_trait::async_trait;
use indexmap::IndexMap;
use stackpilot::StackManager;
use stackpilot_config::Settings;
use stackpilot_container::{
    ComposeRunner, ComposeTarget, ContainerError, ContainerRef, ContainerRuntime, ContainerSpec,
    ContainerState, LogOptions, RawStats, Result, VolumeOutcome,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub container: ContainerRef,
    pub state: ContainerState,
    pub stats: Option<RawStats>,
    pub inspect_fails: bool,
}

/// メモリ上のコンテナランタイム
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<FakeContainer>>,
    volumes: Mutex<HashSet<String>>,
    networks: Mutex<HashSet<String>>,
    specs: Mutex<HashMap<String, ContainerSpec>>,
    /// 削除に失敗させるコンテナ名
    fail_removal: Mutex<HashSet<String>>,
    pub fail_listing: AtomicBool,
    pub volume_creations: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{:012x}{}", n + 1, "deadbeefcafe")
    }

    pub fn add_container(&self, name: &str, running: bool) -> ContainerRef {
        let container = ContainerRef::new(self.next_id(), name);
        self.containers.lock().unwrap().push(FakeContainer {
            container: container.clone(),
            state: ContainerState {
                running,
                status: if running { "running" } else { "exited" }.to_string(),
                health: None,
                memory_limit: None,
            },
            stats: None,
            inspect_fails: false,
        });
        container
    }

    pub fn update_container(&self, name: &str, f: impl FnOnce(&mut FakeContainer)) {
        let mut containers = self.containers.lock().unwrap();
        if let Some(c) = containers.iter_mut().find(|c| c.container.name == name) {
            f(c);
        }
    }

    pub fn container_names(&self) -> Vec<String> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.container.name.clone())
            .collect()
    }

    pub fn remove_by_prefix(&self, prefix: &str) {
        self.containers
            .lock()
            .unwrap()
            .retain(|c| !c.container.name.starts_with(prefix));
    }

    pub fn fail_removal_of(&self, name: &str) {
        self.fail_removal.lock().unwrap().insert(name.to_string());
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes.lock().unwrap().contains(name)
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.networks.lock().unwrap().contains(name)
    }

    pub fn put_spec(&self, spec: ContainerSpec) {
        self.add_container(&spec.name, true);
        self.specs.lock().unwrap().insert(spec.name.clone(), spec);
    }

    pub fn spec(&self, name: &str) -> Option<ContainerSpec> {
        self.specs.lock().unwrap().get(name).cloned()
    }

    fn find(&self, container: &ContainerRef) -> Result<FakeContainer> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.container.id == container.id)
            .cloned()
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: container.name.clone(),
            })
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers_by_prefix(&self, prefix: &str) -> Result<Vec<ContainerRef>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ContainerError::DockerConnectionFailed(
                "connection refused".to_string(),
            ));
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.container.name.starts_with(prefix))
            .map(|c| c.container.clone())
            .collect())
    }

    async fn inspect(&self, container: &ContainerRef) -> Result<ContainerState> {
        let found = self.find(container)?;
        if found.inspect_fails {
            return Err(ContainerError::DockerApiError("inspect failed".to_string()));
        }
        Ok(found.state)
    }

    async fn stats(&self, container: &ContainerRef) -> Result<RawStats> {
        self.find(container)?
            .stats
            .ok_or_else(|| ContainerError::DockerApiError("stats unavailable".to_string()))
    }

    async fn stop_and_remove(
        &self,
        container: &ContainerRef,
        _remove_volumes: bool,
    ) -> Result<()> {
        if self.fail_removal.lock().unwrap().contains(&container.name) {
            return Err(ContainerError::DockerApiError(format!(
                "cannot remove container {}: device or resource busy",
                container.name
            )));
        }
        self.containers
            .lock()
            .unwrap()
            .retain(|c| c.container.id != container.id && c.container.name != container.name);
        self.specs.lock().unwrap().remove(&container.name);
        Ok(())
    }

    async fn ensure_volume(&self, name: &str) -> Result<VolumeOutcome> {
        let mut volumes = self.volumes.lock().unwrap();
        if volumes.insert(name.to_string()) {
            self.volume_creations.fetch_add(1, Ordering::SeqCst);
            Ok(VolumeOutcome::Created)
        } else {
            Ok(VolumeOutcome::AlreadyExists)
        }
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        self.networks.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn inspect_spec(&self, name: &str) -> Result<Option<ContainerSpec>> {
        Ok(self.spec(name))
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        if self.spec(&spec.name).is_some() {
            return Err(ContainerError::Conflict(format!(
                "container name {} is already in use",
                spec.name
            )));
        }
        let container = self.add_container(&spec.name, true);
        self.specs
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        Ok(container.id)
    }
}

/// compose CLI の代わりにランタイムを直接操作する
pub struct FakeCompose {
    runtime: Arc<FakeRuntime>,
    /// `up` で作成するサービス
    services: Vec<String>,
    calls: Mutex<Vec<String>>,
    up_failure: Mutex<Option<String>>,
    pub down_fails: AtomicBool,
    last_env: Mutex<IndexMap<String, String>>,
}

impl FakeCompose {
    pub fn new(runtime: Arc<FakeRuntime>, services: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            services: services.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
            up_failure: Mutex::new(None),
            down_fails: AtomicBool::new(false),
            last_env: Mutex::new(IndexMap::new()),
        })
    }

    /// 次の `up` を、コンテナを作成した後に失敗させる
    pub fn fail_up_with(&self, output: &str) {
        *self.up_failure.lock().unwrap() = Some(output.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_env(&self) -> IndexMap<String, String> {
        self.last_env.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn with_service(verb: &str, target: &ComposeTarget, service: Option<&str>) -> String {
    match service {
        Some(service) => format!("{} {} {}", verb, target.project, service),
        None => format!("{} {}", verb, target.project),
    }
}

#[async_trait]
impl ComposeRunner for FakeCompose {
    async fn up(&self, target: &ComposeTarget, env: &IndexMap<String, String>) -> Result<String> {
        self.record(format!("up {}", target.project));
        *self.last_env.lock().unwrap() = env.clone();

        if !target.manifest.is_file() {
            return Err(ContainerError::CommandFailed {
                command: "docker compose up -d".to_string(),
                output: "no configuration file provided: not found".to_string(),
            });
        }

        let prefix = format!("{}_", target.project);
        self.runtime.remove_by_prefix(&prefix);
        for service in &self.services {
            self.runtime
                .add_container(&format!("{}{}_1", prefix, service), true);
        }

        if let Some(output) = self.up_failure.lock().unwrap().take() {
            return Err(ContainerError::CommandFailed {
                command: "docker compose up -d".to_string(),
                output,
            });
        }
        Ok(String::new())
    }

    async fn start(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()> {
        self.record(with_service("start", target, service));
        Ok(())
    }

    async fn stop(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()> {
        self.record(with_service("stop", target, service));
        Ok(())
    }

    async fn restart(&self, target: &ComposeTarget, service: Option<&str>) -> Result<()> {
        self.record(with_service("restart", target, service));
        Ok(())
    }

    async fn down(&self, target: &ComposeTarget, remove_volumes: bool) -> Result<()> {
        self.record(format!("down {} volumes={}", target.project, remove_volumes));
        if self.down_fails.load(Ordering::SeqCst) {
            return Err(ContainerError::CommandFailed {
                command: "docker compose down".to_string(),
                output: "service \"web\" refers to undefined network".to_string(),
            });
        }
        self.runtime.remove_by_prefix(&format!("{}_", target.project));
        Ok(())
    }

    async fn pull(&self, target: &ComposeTarget) -> Result<()> {
        self.record(format!("pull {}", target.project));
        Ok(())
    }

    async fn logs(&self, target: &ComposeTarget, options: &LogOptions) -> Result<Vec<String>> {
        self.record(format!("logs {}", target.project));
        let service = options.service.as_deref().unwrap_or("web");
        let lines = options.lines.unwrap_or(2);
        Ok((0..lines)
            .map(|i| format!("{}_{}_1  | line {}", target.project, service, i))
            .collect())
    }
}

/// 一時ディレクトリをスタックルートにしたテスト環境
pub struct TestEnv {
    pub root: TempDir,
    pub runtime: Arc<FakeRuntime>,
    pub compose: Arc<FakeCompose>,
    pub manager: StackManager,
}

impl TestEnv {
    pub fn new(services: &[&str]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings {
            stacks_root: root.path().join("stacks"),
            ..Default::default()
        };
        let runtime = FakeRuntime::new();
        let compose = FakeCompose::new(runtime.clone(), services);
        let manager = StackManager::new(settings, runtime.clone(), compose.clone());
        Self {
            root,
            runtime,
            compose,
            manager,
        }
    }

    pub fn stacks_root(&self) -> &Path {
        &self.manager.settings().stacks_root
    }
}
