//! StackPilot コンテナ連携
//!
//! コンテナランタイム（Docker API）と compose CLI を抽象化したトレイトと、その実装を提供します。

pub mod compose;
pub mod docker;
pub mod error;
pub mod runtime;
pub mod stats;
pub mod volume;

pub use compose::{ComposeCli, ComposeRunner, ComposeTarget, LogOptions};
pub use docker::DockerRuntime;
pub use error::{ContainerError, Result};
pub use runtime::{
    ContainerRef, ContainerRuntime, ContainerSpec, ContainerState, RawStats, VolumeOutcome,
};
pub use stats::{cpu_percent, to_service_metrics};
pub use volume::{Ownership, VolumeTarget, prepare_volume};
