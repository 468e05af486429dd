//! 签到内存实现

use crate::error::StorageError;
use crate::models::{AttendanceRecord, AttendanceWriteResult};
use crate::traits::AttendanceStore;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryAttendanceStore {
    records: RwLock<Vec<AttendanceRecord>>,
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn append_attendance(
        &self,
        record: AttendanceRecord,
    ) -> Result<AttendanceWriteResult, StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(existing) = records
            .iter()
            .find(|item| item.attempt_id == record.attempt_id)
        {
            return Ok(AttendanceWriteResult {
                record: existing.clone(),
                inserted: false,
            });
        }
        records.push(record.clone());
        Ok(AttendanceWriteResult {
            record,
            inserted: true,
        })
    }

    async fn list_attendance(
        &self,
        member_id: &str,
        from_ms: Option<i64>,
    ) -> Result<Vec<AttendanceRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<AttendanceRecord> = records
            .iter()
            .filter(|item| item.member_id == member_id)
            .filter(|item| from_ms.is_none_or(|from| item.ts_ms >= from))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.ts_ms.cmp(&a.ts_ms));
        Ok(items)
    }
}
