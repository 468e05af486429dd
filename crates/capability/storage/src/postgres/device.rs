//! Postgres 门禁设备存储实现

use crate::error::StorageError;
use crate::models::{DeviceCreateResult, DeviceRecord};
use crate::traits::DeviceStore;
use crate::validation::ensure_facility_filter;
use domain::{CallerContext, DeviceStatus, SystemInfo};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const DEVICE_COLUMNS: &str = "device_id, owner_id, location, status, \
     (extract(epoch from last_heartbeat_at) * 1000)::bigint as last_heartbeat_ms, \
     uptime_ms, free_heap, rssi, granted_count, denied_count, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms, \
     (extract(epoch from updated_at) * 1000)::bigint as updated_at_ms";

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn device_from_row(row: &PgRow) -> Result<DeviceRecord, StorageError> {
    let status: String = row.try_get("status")?;
    let status = DeviceStatus::parse(&status)
        .ok_or_else(|| StorageError::new(format!("unknown device status: {status}")))?;
    Ok(DeviceRecord {
        device_id: row.try_get("device_id")?,
        owner_id: row.try_get("owner_id")?,
        location: row.try_get("location")?,
        status,
        last_heartbeat_ms: row.try_get("last_heartbeat_ms")?,
        system_info: SystemInfo {
            uptime_ms: row.try_get("uptime_ms")?,
            free_heap: row.try_get("free_heap")?,
            rssi: row.try_get("rssi")?,
        },
        granted_count: row.try_get("granted_count")?,
        denied_count: row.try_get("denied_count")?,
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, StorageError> {
        let sql = format!("select {DEVICE_COLUMNS} from gate_devices where device_id = $1");
        let row = sqlx::query(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn create_device(
        &self,
        record: DeviceRecord,
    ) -> Result<DeviceCreateResult, StorageError> {
        let result = sqlx::query(
            "insert into gate_devices \
             (device_id, owner_id, location, status, granted_count, denied_count, created_at, updated_at) \
             values ($1, $2, $3, $4, 0, 0, to_timestamp($5 / 1000.0), to_timestamp($5 / 1000.0)) \
             on conflict (device_id) do nothing",
        )
        .bind(&record.device_id)
        .bind(&record.owner_id)
        .bind(&record.location)
        .bind(record.status.as_str())
        .bind(record.created_at_ms as f64)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(DeviceCreateResult {
                record,
                inserted: true,
            });
        }
        let existing = self
            .find_device(&record.device_id)
            .await?
            .ok_or_else(|| StorageError::new("device vanished after conflict"))?;
        Ok(DeviceCreateResult {
            record: existing,
            inserted: false,
        })
    }

    async fn list_devices(
        &self,
        ctx: &CallerContext,
        owner_id: Option<&str>,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_facility_filter(ctx, owner_id)?;
        let sql = format!(
            "select {DEVICE_COLUMNS} from gate_devices \
             where ($1::text is null or owner_id = $1) order by device_id"
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn record_heartbeat(
        &self,
        device_id: &str,
        ts_ms: i64,
        system_info: SystemInfo,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let sql = format!(
            "update gate_devices set last_heartbeat_at = to_timestamp($2 / 1000.0), \
             uptime_ms = $3, free_heap = $4, rssi = $5, updated_at = to_timestamp($2 / 1000.0) \
             where device_id = $1 and status <> 'deactivated' returning {DEVICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(ts_ms as f64)
            .bind(system_info.uptime_ms)
            .bind(system_info.free_heap)
            .bind(system_info.rssi)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        ts_ms: i64,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let sql = format!(
            "update gate_devices set status = $2, updated_at = to_timestamp($3 / 1000.0) \
             where device_id = $1 returning {DEVICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(status.as_str())
            .bind(ts_ms as f64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn increment_access(
        &self,
        device_id: &str,
        granted: bool,
    ) -> Result<bool, StorageError> {
        let sql = if granted {
            "update gate_devices set granted_count = granted_count + 1 where device_id = $1"
        } else {
            "update gate_devices set denied_count = denied_count + 1 where device_id = $1"
        };
        let result = sqlx::query(sql).bind(device_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
