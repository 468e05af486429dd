//! 门禁设备内存存储实现

use crate::error::StorageError;
use crate::models::{DeviceCreateResult, DeviceRecord};
use crate::traits::DeviceStore;
use crate::validation::ensure_facility_filter;
use domain::{CallerContext, DeviceStatus, SystemInfo};
use std::collections::HashMap;
use std::sync::RwLock;

/// 门禁设备内存存储
///
/// 注册、心跳与计数器更新都在同一把写锁内完成。
#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.get(device_id).cloned())
    }

    async fn create_device(
        &self,
        record: DeviceRecord,
    ) -> Result<DeviceCreateResult, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(existing) = devices.get(&record.device_id) {
            return Ok(DeviceCreateResult {
                record: existing.clone(),
                inserted: false,
            });
        }
        devices.insert(record.device_id.clone(), record.clone());
        Ok(DeviceCreateResult {
            record,
            inserted: true,
        })
    }

    async fn list_devices(
        &self,
        ctx: &CallerContext,
        owner_id: Option<&str>,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_facility_filter(ctx, owner_id)?;
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<DeviceRecord> = devices
            .values()
            .filter(|item| owner_id.is_none_or(|owner| item.owner_id == owner))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(items)
    }

    async fn record_heartbeat(
        &self,
        device_id: &str,
        ts_ms: i64,
        system_info: SystemInfo,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(record) = devices.get_mut(device_id) else {
            return Ok(None);
        };
        if record.status == DeviceStatus::Deactivated {
            return Ok(None);
        }
        record.last_heartbeat_ms = Some(ts_ms);
        record.system_info = system_info;
        record.updated_at_ms = ts_ms;
        Ok(Some(record.clone()))
    }

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        ts_ms: i64,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(record) = devices.get_mut(device_id) else {
            return Ok(None);
        };
        record.status = status;
        record.updated_at_ms = ts_ms;
        Ok(Some(record.clone()))
    }

    async fn increment_access(
        &self,
        device_id: &str,
        granted: bool,
    ) -> Result<bool, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(record) = devices.get_mut(device_id) else {
            return Ok(false);
        };
        if granted {
            record.granted_count += 1;
        } else {
            record.denied_count += 1;
        }
        Ok(true)
    }
}
