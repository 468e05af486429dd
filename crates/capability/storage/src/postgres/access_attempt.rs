//! Postgres 通行审计实现

use crate::error::StorageError;
use crate::models::{AccessAttemptQuery, AccessAttemptRecord};
use crate::traits::AccessAttemptStore;
use crate::validation::ensure_facility_filter;
use domain::{AccessMethod, AttemptOrigin, CallerContext, Decision, ReasonCode};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const ATTEMPT_COLUMNS: &str = "attempt_id, subject_id, method, facility_id, device_id, result, \
     reason, origin, review_required, (extract(epoch from ts) * 1000)::bigint as ts_ms";

pub struct PgAccessAttemptStore {
    pub pool: PgPool,
}

impl PgAccessAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn attempt_from_row(row: &PgRow) -> Result<AccessAttemptRecord, StorageError> {
    let method: String = row.try_get("method")?;
    let method = AccessMethod::parse(&method)
        .ok_or_else(|| StorageError::new(format!("unknown access method: {method}")))?;
    let result: String = row.try_get("result")?;
    let reason: Option<String> = row.try_get("reason")?;
    let decision = match (result.as_str(), reason.as_deref()) {
        ("granted", _) => Decision::Granted,
        ("denied", Some(code)) => Decision::Denied(
            ReasonCode::parse(code)
                .ok_or_else(|| StorageError::new(format!("unknown reason code: {code}")))?,
        ),
        _ => return Err(StorageError::new(format!("invalid attempt result: {result}"))),
    };
    let origin: String = row.try_get("origin")?;
    let origin = AttemptOrigin::parse(&origin)
        .ok_or_else(|| StorageError::new(format!("unknown attempt origin: {origin}")))?;
    Ok(AccessAttemptRecord {
        attempt_id: row.try_get("attempt_id")?,
        subject_id: row.try_get("subject_id")?,
        method,
        facility_id: row.try_get("facility_id")?,
        device_id: row.try_get("device_id")?,
        decision,
        origin,
        review_required: row.try_get("review_required")?,
        ts_ms: row.try_get("ts_ms")?,
    })
}

#[async_trait::async_trait]
impl AccessAttemptStore for PgAccessAttemptStore {
    async fn append_attempt(
        &self,
        record: AccessAttemptRecord,
    ) -> Result<AccessAttemptRecord, StorageError> {
        sqlx::query(
            "insert into access_attempts \
             (attempt_id, subject_id, method, facility_id, device_id, result, reason, origin, \
              review_required, ts) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, to_timestamp($10 / 1000.0))",
        )
        .bind(&record.attempt_id)
        .bind(&record.subject_id)
        .bind(record.method.as_str())
        .bind(&record.facility_id)
        .bind(&record.device_id)
        .bind(record.decision.result_str())
        .bind(record.decision.reason().map(|reason| reason.code()))
        .bind(record.origin.as_str())
        .bind(record.review_required)
        .bind(record.ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_attempt(
        &self,
        attempt_id: &str,
    ) -> Result<Option<AccessAttemptRecord>, StorageError> {
        let sql = format!("select {ATTEMPT_COLUMNS} from access_attempts where attempt_id = $1");
        let row = sqlx::query(&sql)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(attempt_from_row).transpose()
    }

    async fn list_attempts(
        &self,
        ctx: &CallerContext,
        query: &AccessAttemptQuery,
    ) -> Result<Vec<AccessAttemptRecord>, StorageError> {
        ensure_facility_filter(ctx, query.facility_id.as_deref())?;
        let sql = format!(
            "select {ATTEMPT_COLUMNS} from access_attempts \
             where ($1::text is null or facility_id = $1) \
               and ($2::text is null or subject_id = $2) \
               and ($3::text is null or device_id = $3) \
               and ($4::text is null or result = $4) \
               and ($5 = false or review_required) \
               and ($6::bigint is null or ts >= to_timestamp($6::bigint / 1000.0)) \
               and ($7::bigint is null or ts <= to_timestamp($7::bigint / 1000.0)) \
             order by ts desc, seq desc limit $8 offset $9"
        );
        let result = query
            .granted
            .map(|granted| if granted { "granted" } else { "denied" });
        let rows = sqlx::query(&sql)
            .bind(&query.facility_id)
            .bind(&query.subject_id)
            .bind(&query.device_id)
            .bind(result)
            .bind(query.review_only)
            .bind(query.from_ms)
            .bind(query.to_ms)
            .bind(query.limit.unwrap_or(100).max(0))
            .bind(query.offset.unwrap_or(0).max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(attempt_from_row).collect()
    }
}
