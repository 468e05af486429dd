//! Postgres 签到实现

use crate::error::StorageError;
use crate::models::{AttendanceRecord, AttendanceWriteResult};
use crate::traits::AttendanceStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const ATTENDANCE_COLUMNS: &str = "attendance_id, attempt_id, member_id, facility_id, \
     (extract(epoch from ts) * 1000)::bigint as ts_ms";

pub struct PgAttendanceStore {
    pub pool: PgPool,
}

impl PgAttendanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn attendance_from_row(row: &PgRow) -> Result<AttendanceRecord, StorageError> {
    Ok(AttendanceRecord {
        attendance_id: row.try_get("attendance_id")?,
        attempt_id: row.try_get("attempt_id")?,
        member_id: row.try_get("member_id")?,
        facility_id: row.try_get("facility_id")?,
        ts_ms: row.try_get("ts_ms")?,
    })
}

#[async_trait::async_trait]
impl AttendanceStore for PgAttendanceStore {
    async fn append_attendance(
        &self,
        record: AttendanceRecord,
    ) -> Result<AttendanceWriteResult, StorageError> {
        let result = sqlx::query(
            "insert into attendance_records \
             (attendance_id, attempt_id, member_id, facility_id, ts) \
             values ($1, $2, $3, $4, to_timestamp($5 / 1000.0)) \
             on conflict (attempt_id) do nothing",
        )
        .bind(&record.attendance_id)
        .bind(&record.attempt_id)
        .bind(&record.member_id)
        .bind(&record.facility_id)
        .bind(record.ts_ms as f64)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(AttendanceWriteResult {
                record,
                inserted: true,
            });
        }
        let sql =
            format!("select {ATTENDANCE_COLUMNS} from attendance_records where attempt_id = $1");
        let row = sqlx::query(&sql)
            .bind(&record.attempt_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(AttendanceWriteResult {
            record: attendance_from_row(&row)?,
            inserted: false,
        })
    }

    async fn list_attendance(
        &self,
        member_id: &str,
        from_ms: Option<i64>,
    ) -> Result<Vec<AttendanceRecord>, StorageError> {
        let sql = format!(
            "select {ATTENDANCE_COLUMNS} from attendance_records \
             where member_id = $1 \
               and ($2::bigint is null or ts >= to_timestamp($2::bigint / 1000.0)) \
             order by ts desc"
        );
        let rows = sqlx::query(&sql)
            .bind(member_id)
            .bind(from_ms)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(attendance_from_row).collect()
    }
}
