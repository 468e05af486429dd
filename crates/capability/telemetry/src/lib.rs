//! 追踪、请求 ID 与通行计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub access_granted: u64,
    pub access_denied: u64,
    pub rate_limited: u64,
    pub emergency_grants: u64,
    pub heartbeats_accepted: u64,
    pub heartbeats_rejected: u64,
    pub attendance_recorded: u64,
    pub storage_failures: u64,
    pub verify_latency_ms_total: u64,
    pub verify_latency_ms_count: u64,
}

/// 进程内计数器。
#[derive(Default)]
pub struct TelemetryMetrics {
    access_granted: AtomicU64,
    access_denied: AtomicU64,
    rate_limited: AtomicU64,
    emergency_grants: AtomicU64,
    heartbeats_accepted: AtomicU64,
    heartbeats_rejected: AtomicU64,
    attendance_recorded: AtomicU64,
    storage_failures: AtomicU64,
    verify_latency_ms_total: AtomicU64,
    verify_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            access_granted: self.access_granted.load(Ordering::Relaxed),
            access_denied: self.access_denied.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            emergency_grants: self.emergency_grants.load(Ordering::Relaxed),
            heartbeats_accepted: self.heartbeats_accepted.load(Ordering::Relaxed),
            heartbeats_rejected: self.heartbeats_rejected.load(Ordering::Relaxed),
            attendance_recorded: self.attendance_recorded.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            verify_latency_ms_total: self.verify_latency_ms_total.load(Ordering::Relaxed),
            verify_latency_ms_count: self.verify_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录一次放行。
pub fn record_access_granted() {
    metrics().access_granted.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次拒绝。
pub fn record_access_denied() {
    metrics().access_denied.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次限流拒绝（同时计入拒绝数）。
pub fn record_rate_limited() {
    metrics().rate_limited.fetch_add(1, Ordering::Relaxed);
}

/// 记录应急放行（需人工复核）。
pub fn record_emergency_grant() {
    metrics().emergency_grants.fetch_add(1, Ordering::Relaxed);
}

pub fn record_heartbeat_accepted() {
    metrics().heartbeats_accepted.fetch_add(1, Ordering::Relaxed);
}

pub fn record_heartbeat_rejected() {
    metrics().heartbeats_rejected.fetch_add(1, Ordering::Relaxed);
}

pub fn record_attendance_recorded() {
    metrics().attendance_recorded.fetch_add(1, Ordering::Relaxed);
}

/// 记录存储故障（限流存储、审计写入等）。
pub fn record_storage_failure() {
    metrics().storage_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次校验耗时（毫秒）。
pub fn record_verify_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .verify_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .verify_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
