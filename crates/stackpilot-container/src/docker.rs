//! Docker API (bollard) によるランタイム実装

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::error::{ContainerError, Result};
use crate::runtime::{
    ContainerRef, ContainerRuntime, ContainerSpec, ContainerState, RawStats, VolumeOutcome,
};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{Config, CreateContainerOptions, ListContainersOptions};
use bollard::models::{
    ContainerInspectResponse, ContainerStatsResponse, HostConfig, NetworkCreateRequest,
    PortBinding, RestartPolicy, RestartPolicyNameEnum, VolumeCreateOptions,
};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info};

/// Docker ランタイム
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// ローカルの Docker に接続し、疎通を確認する
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        Ok(Self { docker })
    }

    async fn inspect_raw(&self, name: &str) -> Result<ContainerInspectResponse> {
        let info = self
            .docker
            .inspect_container(name, None::<bollard::query_parameters::InspectContainerOptions>)
            .await?;
        Ok(info)
    }
}

fn is_status(err: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers_by_prefix(&self, prefix: &str) -> Result<Vec<ContainerRef>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![prefix.to_string()]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;

        // name フィルタは部分一致なので、前方一致で絞り込む
        let refs = containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string())?;
                name.starts_with(prefix).then(|| ContainerRef::new(id, name))
            })
            .collect::<Vec<_>>();

        debug!(prefix = %prefix, count = refs.len(), "Listed containers by prefix");
        Ok(refs)
    }

    async fn inspect(&self, container: &ContainerRef) -> Result<ContainerState> {
        let info = self.inspect_raw(&container.id).await?;

        let state = info
            .state
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: container.name.clone(),
            })?;

        let memory_limit = info
            .host_config
            .as_ref()
            .and_then(|h| h.memory)
            .filter(|m| *m > 0)
            .map(|m| m as u64);

        Ok(ContainerState {
            running: state.running.unwrap_or(false),
            status: state
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            health: state
                .health
                .and_then(|h| h.status)
                .map(|s| s.to_string())
                .filter(|s| !s.is_empty() && s != "none"),
            memory_limit,
        })
    }

    async fn stats(&self, container: &ContainerRef) -> Result<RawStats> {
        let options = bollard::query_parameters::StatsOptions {
            stream: false,
            one_shot: false,
            ..Default::default()
        };

        let mut stream = self.docker.stats(&container.id, Some(options));
        match stream.next().await {
            Some(Ok(stats)) => Ok(raw_stats(&stats)),
            Some(Err(e)) => Err(e.into()),
            None => Err(ContainerError::DockerApiError(format!(
                "コンテナ '{}' の統計情報が取得できません",
                container.name
            ))),
        }
    }

    async fn stop_and_remove(
        &self,
        container: &ContainerRef,
        remove_volumes: bool,
    ) -> Result<()> {
        match self
            .docker
            .stop_container(
                &container.id,
                None::<bollard::query_parameters::StopContainerOptions>,
            )
            .await
        {
            Ok(_) => debug!(container = %container.name, "Stopped container"),
            // 304: 既に停止中 / 404: 既に存在しない
            Err(e) if is_status(&e, 304) || is_status(&e, 404) => {}
            Err(e) => return Err(e.into()),
        }

        match self
            .docker
            .remove_container(
                &container.id,
                Some(bollard::query_parameters::RemoveContainerOptions {
                    force: true,
                    v: remove_volumes,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(_) => {
                info!(container = %container.name, "Removed container");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_volume(&self, name: &str) -> Result<VolumeOutcome> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => return Ok(VolumeOutcome::AlreadyExists),
            Err(e) if is_status(&e, 404) => {}
            Err(e) => return Err(e.into()),
        }

        let options = VolumeCreateOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };
        match self.docker.create_volume(options).await {
            Ok(_) => {
                info!(volume = %name, "Created volume");
                Ok(VolumeOutcome::Created)
            }
            // 並行して作成された場合
            Err(e) if is_status(&e, 409) => Ok(VolumeOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        match self
            .docker
            .inspect_network(name, None::<bollard::query_parameters::InspectNetworkOptions>)
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) if is_status(&e, 404) => {}
            Err(e) => return Err(e.into()),
        }

        let request = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            ..Default::default()
        };
        match self.docker.create_network(request).await {
            Ok(_) => {
                info!(network = %name, "Created network");
                Ok(())
            }
            Err(e) if is_status(&e, 409) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn inspect_spec(&self, name: &str) -> Result<Option<ContainerSpec>> {
        let info = match self.inspect_raw(name).await {
            Ok(info) => info,
            Err(ContainerError::ContainerNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let config = info.config.unwrap_or_default();
        let host = info.host_config.unwrap_or_default();

        let ports = host
            .port_bindings
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(container_port, bindings)| {
                let container = container_port.split('/').next()?.parse::<u16>().ok()?;
                let host_port = bindings?
                    .first()?
                    .host_port
                    .as_deref()?
                    .parse::<u16>()
                    .ok()?;
                Some((host_port, container))
            })
            .collect();

        Ok(Some(ContainerSpec {
            name: name.to_string(),
            image: config.image.unwrap_or_default(),
            args: config.cmd.unwrap_or_default(),
            labels: config.labels.unwrap_or_default(),
            env: config.env.unwrap_or_default(),
            binds: host.binds.unwrap_or_default(),
            ports,
            network: host.network_mode.filter(|m| m != "default"),
        }))
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut port_bindings = HashMap::new();
        let mut exposed_ports = HashMap::new();
        for (host_port, container_port) in &spec.ports {
            let key = format!("{}/tcp", container_port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(host_port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(spec.binds.clone()),
            network_mode: spec.network.clone(),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.args.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        self.docker
            .start_container(
                &response.id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await?;

        info!(container = %spec.name, id = %response.id, "Started container");
        Ok(response.id)
    }
}

/// bollard の統計レスポンスを RawStats に変換する
fn raw_stats(stats: &ContainerStatsResponse) -> RawStats {
    let cpu = stats.cpu_stats.as_ref();
    let precpu = stats.precpu_stats.as_ref();

    let online_cpus = cpu
        .and_then(|c| c.online_cpus)
        .map(|n| n as u32)
        .filter(|n| *n > 0)
        .or_else(|| {
            cpu.and_then(|c| c.cpu_usage.as_ref())
                .and_then(|u| u.percpu_usage.as_ref())
                .map(|p| p.len() as u32)
                .filter(|n| *n > 0)
        })
        .unwrap_or(1);

    let (network_rx, network_tx) = stats
        .networks
        .as_ref()
        .map(|networks| {
            networks.values().fold((0u64, 0u64), |(rx, tx), n| {
                (
                    rx + n.rx_bytes.unwrap_or(0) as u64,
                    tx + n.tx_bytes.unwrap_or(0) as u64,
                )
            })
        })
        .unwrap_or((0, 0));

    RawStats {
        cpu_total: cpu
            .and_then(|c| c.cpu_usage.as_ref())
            .and_then(|u| u.total_usage)
            .unwrap_or(0) as u64,
        system_cpu: cpu.and_then(|c| c.system_cpu_usage).unwrap_or(0) as u64,
        precpu_total: precpu
            .and_then(|c| c.cpu_usage.as_ref())
            .and_then(|u| u.total_usage)
            .unwrap_or(0) as u64,
        presystem_cpu: precpu.and_then(|c| c.system_cpu_usage).unwrap_or(0) as u64,
        online_cpus,
        memory_usage: stats
            .memory_stats
            .as_ref()
            .and_then(|m| m.usage)
            .unwrap_or(0) as u64,
        network_rx,
        network_tx,
    }
}
