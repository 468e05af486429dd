//! Postgres 运维审计实现

use crate::error::StorageError;
use crate::models::{AuditLogQuery, AuditLogRecord};
use crate::traits::AuditLogStore;
use crate::validation::ensure_facility_filter;
use domain::CallerContext;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgAuditLogStore {
    pub pool: PgPool,
}

impl PgAuditLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn audit_from_row(row: &PgRow) -> Result<AuditLogRecord, sqlx::Error> {
    Ok(AuditLogRecord {
        audit_id: row.try_get("audit_id")?,
        facility_id: row.try_get("facility_id")?,
        actor: row.try_get("actor")?,
        action: row.try_get("action")?,
        resource: row.try_get("resource")?,
        result: row.try_get("result")?,
        detail: row.try_get("detail")?,
        ts_ms: row.try_get("ts_ms")?,
    })
}

#[async_trait::async_trait]
impl AuditLogStore for PgAuditLogStore {
    async fn create_audit_log(
        &self,
        record: AuditLogRecord,
    ) -> Result<AuditLogRecord, StorageError> {
        sqlx::query(
            "insert into audit_logs \
             (audit_id, facility_id, actor, action, resource, result, detail, ts) \
             values ($1, $2, $3, $4, $5, $6, $7, to_timestamp($8::bigint / 1000.0))",
        )
        .bind(&record.audit_id)
        .bind(record.facility_id.as_deref())
        .bind(&record.actor)
        .bind(&record.action)
        .bind(&record.resource)
        .bind(&record.result)
        .bind(record.detail.as_deref())
        .bind(record.ts_ms)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_audit_logs(
        &self,
        ctx: &CallerContext,
        query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogRecord>, StorageError> {
        ensure_facility_filter(ctx, query.facility_id.as_deref())?;
        let rows = sqlx::query(
            "select audit_id, facility_id, actor, action, resource, result, detail, \
             (extract(epoch from ts) * 1000)::bigint as ts_ms \
             from audit_logs \
             where ($1::text is null or facility_id = $1) \
               and ($2::text is null or actor = $2) \
               and ($3::text is null or starts_with(action, $3)) \
               and ($4::bigint is null or ts >= to_timestamp($4::bigint / 1000.0)) \
               and ($5::bigint is null or ts <= to_timestamp($5::bigint / 1000.0)) \
             order by ts desc limit $6",
        )
        .bind(query.facility_id.as_deref())
        .bind(query.actor.as_deref())
        .bind(query.action_prefix.as_deref())
        .bind(query.from_ms)
        .bind(query.to_ms)
        .bind(query.effective_limit())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| audit_from_row(row).map_err(StorageError::from))
            .collect()
    }
}
