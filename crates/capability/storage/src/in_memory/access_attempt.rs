//! 通行审计内存实现

use crate::error::StorageError;
use crate::models::{AccessAttemptQuery, AccessAttemptRecord};
use crate::traits::AccessAttemptStore;
use crate::validation::ensure_facility_filter;
use domain::CallerContext;
use std::sync::RwLock;

/// 通行审计内存存储（按到达顺序追加）。
#[derive(Default)]
pub struct InMemoryAccessAttemptStore {
    attempts: RwLock<Vec<AccessAttemptRecord>>,
}

impl InMemoryAccessAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AccessAttemptStore for InMemoryAccessAttemptStore {
    async fn append_attempt(
        &self,
        record: AccessAttemptRecord,
    ) -> Result<AccessAttemptRecord, StorageError> {
        let mut attempts = self
            .attempts
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if attempts.iter().any(|item| item.attempt_id == record.attempt_id) {
            return Err(StorageError::new("attempt already recorded"));
        }
        attempts.push(record.clone());
        Ok(record)
    }

    async fn find_attempt(
        &self,
        attempt_id: &str,
    ) -> Result<Option<AccessAttemptRecord>, StorageError> {
        let attempts = self
            .attempts
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(attempts
            .iter()
            .find(|item| item.attempt_id == attempt_id)
            .cloned())
    }

    async fn list_attempts(
        &self,
        ctx: &CallerContext,
        query: &AccessAttemptQuery,
    ) -> Result<Vec<AccessAttemptRecord>, StorageError> {
        ensure_facility_filter(ctx, query.facility_id.as_deref())?;
        let attempts = self
            .attempts
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.unwrap_or(100).max(0) as usize;
        Ok(attempts
            .iter()
            .rev()
            .filter(|item| query.matches(item))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
