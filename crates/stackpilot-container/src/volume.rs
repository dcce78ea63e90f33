//! ボリュームの準備
//!
//! 参照がパス（`/` で始まる）ならホスト上のディレクトリ、それ以外は名前付きボリュームとして扱います。

use crate::error::Result;
use crate::runtime::{ContainerRuntime, VolumeOutcome};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// バインドディレクトリのパーミッション
const BIND_DIR_MODE: u32 = 0o750;

/// ボリューム参照の種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeTarget {
    Named(String),
    BindPath(PathBuf),
}

impl VolumeTarget {
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if reference.starts_with('/') {
            Some(Self::BindPath(PathBuf::from(reference)))
        } else {
            Some(Self::Named(reference.to_string()))
        }
    }
}

/// 作成したディレクトリの所有者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// ボリュームを用意する（既存なら何もしない）
pub async fn prepare_volume(
    runtime: &dyn ContainerRuntime,
    target: &VolumeTarget,
    owner: Ownership,
) -> Result<VolumeOutcome> {
    match target {
        VolumeTarget::Named(name) => runtime.ensure_volume(name).await,
        VolumeTarget::BindPath(path) => prepare_bind_path(path, owner),
    }
}

fn prepare_bind_path(path: &Path, owner: Ownership) -> Result<VolumeOutcome> {
    if path.is_dir() {
        return Ok(VolumeOutcome::AlreadyExists);
    }

    std::fs::create_dir_all(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(BIND_DIR_MODE))?;

    // 非特権で動いている場合は所有者を変更できないので続行する
    if let Err(e) = nix::unistd::chown(
        path,
        Some(nix::unistd::Uid::from_raw(owner.uid)),
        Some(nix::unistd::Gid::from_raw(owner.gid)),
    ) {
        warn!(
            path = %path.display(),
            uid = owner.uid,
            gid = owner.gid,
            error = %e,
            "Failed to change owner of volume directory"
        );
    }

    info!(path = %path.display(), "Created volume directory");
    Ok(VolumeOutcome::Created)
}
