//! 门禁设备注册表与心跳监控。
//!
//! 在线状态不落库：所有读取都经 `domain::is_online` 现场推导。

use domain::{CallerContext, DeviceStatus, ReasonCode, Role, SystemInfo, is_online};
use gate_storage::{AuditLogRecord, AuditLogStore, DeviceRecord, DeviceStore};
use gate_telemetry::{record_heartbeat_accepted, record_heartbeat_rejected};
use std::sync::Arc;
use tracing::{info, warn};

/// 设备注册表错误。
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device already registered")]
    DuplicateDevice,
    #[error("device not registered")]
    UnknownDevice,
    #[error("device deactivated")]
    Deactivated,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl DeviceError {
    /// 对应的拒绝原因；权限与输入错误没有对应项。
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            DeviceError::DuplicateDevice => Some(ReasonCode::DuplicateDevice),
            DeviceError::UnknownDevice => Some(ReasonCode::UnknownDevice),
            DeviceError::Deactivated => Some(ReasonCode::Deactivated),
            DeviceError::Storage(_) => Some(ReasonCode::StorageUnavailable),
            DeviceError::Forbidden | DeviceError::InvalidInput(_) => None,
        }
    }
}

fn storage_err(err: gate_storage::StorageError) -> DeviceError {
    DeviceError::Storage(err.to_string())
}

/// 设备 ID 规范化：去空白、转大写。空串返回 `None`。
pub fn normalize_device_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceRegistryConfig {
    pub heartbeat_interval_ms: i64,
    pub online_threshold_ms: i64,
}

impl Default for DeviceRegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            online_threshold_ms: 90_000,
        }
    }
}

/// 带在线推导结果的设备视图。
#[derive(Debug, Clone)]
pub struct DeviceView {
    pub record: DeviceRecord,
    pub is_online: bool,
}

#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub device: DeviceView,
    /// `false` 表示同一场馆重复注册，返回既有设备。
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct HeartbeatAck {
    pub device_id: String,
    pub status: DeviceStatus,
    pub received_at_ms: i64,
    pub next_heartbeat_ms: i64,
}

/// 设备健康汇总（供外部定时轮询）。
#[derive(Debug, Clone)]
pub struct DeviceHealth {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub maintenance: usize,
    pub deactivated: usize,
    pub checked_at_ms: i64,
    pub devices: Vec<DeviceView>,
}

pub struct DeviceRegistry {
    device_store: Arc<dyn DeviceStore>,
    audit_store: Arc<dyn AuditLogStore>,
    config: DeviceRegistryConfig,
}

impl DeviceRegistry {
    pub fn new(
        device_store: Arc<dyn DeviceStore>,
        audit_store: Arc<dyn AuditLogStore>,
        config: DeviceRegistryConfig,
    ) -> Self {
        Self {
            device_store,
            audit_store,
            config,
        }
    }

    pub fn config(&self) -> &DeviceRegistryConfig {
        &self.config
    }

    pub fn is_online(&self, record: &DeviceRecord, now_ms: i64) -> bool {
        is_online(
            record.last_heartbeat_ms,
            record.status,
            now_ms,
            self.config.online_threshold_ms,
        )
    }

    fn view(&self, record: DeviceRecord, now_ms: i64) -> DeviceView {
        let is_online = self.is_online(&record, now_ms);
        DeviceView { record, is_online }
    }

    /// 场馆主（或管理员）注册设备。
    ///
    /// 已被其他场馆注册的 ID 返回 `DuplicateDevice`；同一场馆重复注册幂等。
    pub async fn register(
        &self,
        ctx: &CallerContext,
        device_id: &str,
        owner_id: &str,
        location: &str,
        now_ms: i64,
    ) -> Result<RegisterOutcome, DeviceError> {
        let device_id = normalize_device_id(device_id)
            .ok_or_else(|| DeviceError::InvalidInput("deviceId required".to_string()))?;
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(DeviceError::InvalidInput("ownerId required".to_string()));
        }
        ensure_operator(ctx, owner_id)?;

        let record = DeviceRecord {
            device_id: device_id.clone(),
            owner_id: owner_id.to_string(),
            location: location.trim().to_string(),
            status: DeviceStatus::Active,
            last_heartbeat_ms: None,
            system_info: SystemInfo::default(),
            granted_count: 0,
            denied_count: 0,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        let written = self
            .device_store
            .create_device(record)
            .await
            .map_err(storage_err)?;
        if !written.inserted {
            if written.record.owner_id != owner_id {
                warn!(
                    target: "gate.devices",
                    device_id = %device_id,
                    owner_id = %owner_id,
                    "device_duplicate_rejected"
                );
                return Err(DeviceError::DuplicateDevice);
            }
            return Ok(RegisterOutcome {
                device: self.view(written.record, now_ms),
                created: false,
            });
        }
        self.audit(ctx, owner_id, "DEVICE.REGISTER", &device_id, "created", now_ms)
            .await;
        info!(
            target: "gate.devices",
            device_id = %device_id,
            owner_id = %owner_id,
            actor = %ctx.subject_id,
            "device_registered"
        );
        Ok(RegisterOutcome {
            device: self.view(written.record, now_ms),
            created: true,
        })
    }

    /// 记录心跳。未注册返回 `UnknownDevice`，已停用返回 `Deactivated`。
    pub async fn heartbeat(
        &self,
        device_id: &str,
        system_info: SystemInfo,
        now_ms: i64,
    ) -> Result<HeartbeatAck, DeviceError> {
        let device_id = normalize_device_id(device_id)
            .ok_or_else(|| DeviceError::InvalidInput("deviceId required".to_string()))?;
        let updated = self
            .device_store
            .record_heartbeat(&device_id, now_ms, system_info)
            .await
            .map_err(storage_err)?;
        let Some(record) = updated else {
            record_heartbeat_rejected();
            let existing = self
                .device_store
                .find_device(&device_id)
                .await
                .map_err(storage_err)?;
            let err = match existing {
                Some(_) => DeviceError::Deactivated,
                None => DeviceError::UnknownDevice,
            };
            warn!(target: "gate.devices", device_id = %device_id, error = %err, "heartbeat_rejected");
            return Err(err);
        };
        record_heartbeat_accepted();
        info!(
            target: "gate.devices",
            device_id = %record.device_id,
            status = record.status.as_str(),
            uptime_ms = ?record.system_info.uptime_ms,
            rssi = ?record.system_info.rssi,
            "heartbeat_received"
        );
        Ok(HeartbeatAck {
            device_id: record.device_id,
            status: record.status,
            received_at_ms: now_ms,
            next_heartbeat_ms: now_ms + self.config.heartbeat_interval_ms,
        })
    }

    /// 软停用：状态置为 deactivated，记录与计数保留。
    pub async fn deactivate(
        &self,
        ctx: &CallerContext,
        device_id: &str,
        now_ms: i64,
    ) -> Result<DeviceView, DeviceError> {
        let record = self.find_scoped(ctx, device_id).await?;
        let updated = self
            .device_store
            .update_status(&record.device_id, DeviceStatus::Deactivated, now_ms)
            .await
            .map_err(storage_err)?
            .ok_or(DeviceError::UnknownDevice)?;
        self.audit(
            ctx,
            &updated.owner_id,
            "DEVICE.DEACTIVATE",
            &updated.device_id,
            "deactivated",
            now_ms,
        )
        .await;
        info!(
            target: "gate.devices",
            device_id = %updated.device_id,
            actor = %ctx.subject_id,
            "device_deactivated"
        );
        Ok(self.view(updated, now_ms))
    }

    /// 在 active 与 maintenance 之间切换。停用请走 `deactivate`，停用后不可恢复。
    pub async fn set_status(
        &self,
        ctx: &CallerContext,
        device_id: &str,
        status: DeviceStatus,
        now_ms: i64,
    ) -> Result<DeviceView, DeviceError> {
        if status == DeviceStatus::Deactivated {
            return Err(DeviceError::InvalidInput(
                "use deactivate to retire a device".to_string(),
            ));
        }
        let record = self.find_scoped(ctx, device_id).await?;
        if record.status == DeviceStatus::Deactivated {
            return Err(DeviceError::Deactivated);
        }
        let updated = self
            .device_store
            .update_status(&record.device_id, status, now_ms)
            .await
            .map_err(storage_err)?
            .ok_or(DeviceError::UnknownDevice)?;
        self.audit(
            ctx,
            &updated.owner_id,
            "DEVICE.STATUS",
            &updated.device_id,
            status.as_str(),
            now_ms,
        )
        .await;
        info!(
            target: "gate.devices",
            device_id = %updated.device_id,
            status = status.as_str(),
            actor = %ctx.subject_id,
            "device_status_changed"
        );
        Ok(self.view(updated, now_ms))
    }

    pub async fn find(&self, device_id: &str) -> Result<Option<DeviceRecord>, DeviceError> {
        let Some(device_id) = normalize_device_id(device_id) else {
            return Ok(None);
        };
        self.device_store
            .find_device(&device_id)
            .await
            .map_err(storage_err)
    }

    /// 运维读取：设备必须属于调用方可访问的场馆。
    pub async fn find_scoped(
        &self,
        ctx: &CallerContext,
        device_id: &str,
    ) -> Result<DeviceRecord, DeviceError> {
        let record = self.find(device_id).await?.ok_or(DeviceError::UnknownDevice)?;
        ensure_operator(ctx, &record.owner_id)?;
        Ok(record)
    }

    /// `owner_id = None` 时：管理员全量，其他角色取自身场馆。
    pub async fn list_for_owner(
        &self,
        ctx: &CallerContext,
        owner_id: Option<&str>,
        now_ms: i64,
    ) -> Result<Vec<DeviceView>, DeviceError> {
        let owner_id = match owner_id {
            Some(owner_id) => Some(owner_id),
            None if ctx.is_admin() => None,
            None => Some(ctx.facility_id.as_str()),
        };
        if let Some(owner_id) = owner_id {
            if !ctx.is_admin() && !ctx.is_staff() {
                return Err(DeviceError::Forbidden);
            }
            if !ctx.can_access_facility(owner_id) {
                return Err(DeviceError::Forbidden);
            }
        }
        let records = self
            .device_store
            .list_devices(ctx, owner_id)
            .await
            .map_err(storage_err)?;
        Ok(records
            .into_iter()
            .map(|record| self.view(record, now_ms))
            .collect())
    }

    pub async fn health(
        &self,
        ctx: &CallerContext,
        owner_id: Option<&str>,
        now_ms: i64,
    ) -> Result<DeviceHealth, DeviceError> {
        let devices = self.list_for_owner(ctx, owner_id, now_ms).await?;
        let mut health = DeviceHealth {
            total: devices.len(),
            online: 0,
            offline: 0,
            maintenance: 0,
            deactivated: 0,
            checked_at_ms: now_ms,
            devices: Vec::new(),
        };
        for device in &devices {
            match device.record.status {
                DeviceStatus::Deactivated => health.deactivated += 1,
                DeviceStatus::Maintenance => health.maintenance += 1,
                DeviceStatus::Active => {}
            }
            if device.is_online {
                health.online += 1;
            } else {
                health.offline += 1;
            }
        }
        health.devices = devices;
        Ok(health)
    }

    /// 累加放行 / 拒绝计数（存储内原子自增）。
    pub async fn record_access(&self, device_id: &str, granted: bool) -> Result<(), DeviceError> {
        let updated = self
            .device_store
            .increment_access(device_id, granted)
            .await
            .map_err(storage_err)?;
        if !updated {
            return Err(DeviceError::UnknownDevice);
        }
        Ok(())
    }

    async fn audit(
        &self,
        ctx: &CallerContext,
        facility_id: &str,
        action: &str,
        device_id: &str,
        result: &str,
        now_ms: i64,
    ) {
        let record = AuditLogRecord {
            audit_id: uuid::Uuid::new_v4().to_string(),
            facility_id: Some(facility_id.to_string()),
            actor: ctx.subject_id.clone(),
            action: action.to_string(),
            resource: format!("device:{}", device_id),
            result: result.to_string(),
            detail: None,
            ts_ms: now_ms,
        };
        if let Err(err) = self.audit_store.create_audit_log(record).await {
            warn!(target: "gate.devices", device_id = %device_id, error = %err, "audit_write_failed");
        }
    }
}

/// 设备运维权限：管理员任意场馆；场馆主只限自身场馆。
fn ensure_operator(ctx: &CallerContext, owner_id: &str) -> Result<(), DeviceError> {
    if ctx.is_admin() {
        return Ok(());
    }
    if ctx.has_role(Role::GymOwner) && ctx.can_access_facility(owner_id) {
        return Ok(());
    }
    Err(DeviceError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_are_normalised() {
        assert_eq!(normalize_device_id("  gate-01 ").as_deref(), Some("GATE-01"));
        assert_eq!(normalize_device_id("   "), None);
    }

    #[test]
    fn storage_errors_map_to_fail_closed_reason() {
        assert_eq!(
            DeviceError::Storage("down".to_string()).reason(),
            Some(ReasonCode::StorageUnavailable)
        );
        assert_eq!(DeviceError::Forbidden.reason(), None);
    }
}
