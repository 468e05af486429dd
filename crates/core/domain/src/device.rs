//! 门禁设备状态与在线判定。

/// 设备生命周期状态。停用为软删除，历史保留。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Active,
    Maintenance,
    Deactivated,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Maintenance => "maintenance",
            DeviceStatus::Deactivated => "deactivated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "active" => Some(DeviceStatus::Active),
            "maintenance" => Some(DeviceStatus::Maintenance),
            "deactivated" | "inactive" => Some(DeviceStatus::Deactivated),
            _ => None,
        }
    }
}

/// 设备自报遥测（不透明，仅展示）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemInfo {
    pub uptime_ms: Option<i64>,
    pub free_heap: Option<i64>,
    pub rssi: Option<i32>,
}

/// 设备是否在线。
///
/// 唯一的在线定义：注册表列表、校验器与运维看板都调用这里。
/// 从未上报心跳或已停用的设备视为离线。
pub fn is_online(
    last_heartbeat_ms: Option<i64>,
    status: DeviceStatus,
    now_ms: i64,
    threshold_ms: i64,
) -> bool {
    if status == DeviceStatus::Deactivated {
        return false;
    }
    match last_heartbeat_ms {
        Some(last) => now_ms - last < threshold_ms,
        None => false,
    }
}
