//! 运维审计内存实现：按写入顺序追加，读取时倒序过滤。

use crate::error::StorageError;
use crate::models::{AuditLogQuery, AuditLogRecord};
use crate::traits::AuditLogStore;
use crate::validation::ensure_facility_filter;
use domain::CallerContext;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryAuditLogStore {
    entries: RwLock<Vec<AuditLogRecord>>,
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn create_audit_log(
        &self,
        record: AuditLogRecord,
    ) -> Result<AuditLogRecord, StorageError> {
        self.entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?
            .push(record.clone());
        Ok(record)
    }

    async fn list_audit_logs(
        &self,
        ctx: &CallerContext,
        query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogRecord>, StorageError> {
        ensure_facility_filter(ctx, query.facility_id.as_deref())?;
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<AuditLogRecord> = entries
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        // 同一毫秒内保持写入逆序
        items.reverse();
        items.sort_by(|a, b| b.ts_ms.cmp(&a.ts_ms));
        items.truncate(query.effective_limit() as usize);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Role;

    fn record(facility: Option<&str>, action: &str, ts_ms: i64) -> AuditLogRecord {
        AuditLogRecord {
            audit_id: format!("audit-{ts_ms}"),
            facility_id: facility.map(str::to_string),
            actor: "gym-1".to_string(),
            action: action.to_string(),
            resource: "device:GATE-01".to_string(),
            result: "ok".to_string(),
            detail: None,
            ts_ms,
        }
    }

    #[tokio::test]
    async fn filters_by_facility_and_action_family() {
        let store = InMemoryAuditLogStore::new();
        for entry in [
            record(Some("gym-1"), "DEVICE.REGISTER", 10),
            record(Some("gym-1"), "DEVICE.STATUS", 20),
            record(Some("gym-2"), "DEVICE.REGISTER", 30),
            record(None, "RATE_LIMIT.RESET", 40),
        ] {
            store.create_audit_log(entry).await.expect("append");
        }

        let owner = CallerContext::new("gym-1", "gym-1", vec![Role::GymOwner]);
        let query = AuditLogQuery {
            facility_id: Some("gym-1".to_string()),
            action_prefix: Some("DEVICE.".to_string()),
            ..AuditLogQuery::default()
        };
        let items = store.list_audit_logs(&owner, &query).await.expect("list");
        let stamps: Vec<i64> = items.iter().map(|item| item.ts_ms).collect();
        assert_eq!(stamps, vec![20, 10]);

        let admin = CallerContext::new("", "admin", vec![Role::Admin]);
        let all = AuditLogQuery {
            limit: Some(2),
            ..AuditLogQuery::default()
        };
        let items = store.list_audit_logs(&admin, &all).await.expect("list");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].action, "RATE_LIMIT.RESET");
    }

    #[tokio::test]
    async fn unscoped_listing_needs_admin() {
        let store = InMemoryAuditLogStore::new();
        let owner = CallerContext::new("gym-1", "gym-1", vec![Role::GymOwner]);
        assert!(
            store
                .list_audit_logs(&owner, &AuditLogQuery::default())
                .await
                .is_err()
        );
    }
}
