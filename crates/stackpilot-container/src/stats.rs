//! 統計値からサービスメトリクスへの変換

use crate::runtime::RawStats;
use stackpilot_core::ServiceMetrics;

/// CPU使用率（%）
///
/// `(cpu差分 / システム差分) * オンラインCPU数 * 100`。
/// どちらかの差分が負、またはシステム差分が 0 の場合は 0。
pub fn cpu_percent(stats: &RawStats) -> f64 {
    let (Some(cpu_delta), Some(system_delta)) = (
        stats.cpu_total.checked_sub(stats.precpu_total),
        stats.system_cpu.checked_sub(stats.presystem_cpu),
    ) else {
        return 0.0;
    };

    if system_delta == 0 {
        return 0.0;
    }

    let online = f64::from(stats.online_cpus.max(1));
    (cpu_delta as f64 / system_delta as f64) * online * 100.0
}

/// メトリクスを組み立てる
///
/// `configured_limit` はコンテナに明示設定されたメモリ上限。未設定なら上限・使用率とも 0
/// （ランタイムが報告するホスト全体の上限は返さない）。
pub fn to_service_metrics(
    name: impl Into<String>,
    stats: &RawStats,
    configured_limit: Option<u64>,
) -> ServiceMetrics {
    let memory_limit = configured_limit.filter(|l| *l > 0).unwrap_or(0);
    let memory_percent = if memory_limit > 0 {
        stats.memory_usage as f64 / memory_limit as f64 * 100.0
    } else {
        0.0
    };

    ServiceMetrics {
        name: name.into(),
        cpu_percent: cpu_percent(stats),
        memory_used: stats.memory_usage,
        memory_limit,
        memory_percent,
        network_rx: stats.network_rx,
        network_tx: stats.network_tx,
    }
}
