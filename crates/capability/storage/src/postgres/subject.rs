//! Postgres 主体存储实现

use crate::error::StorageError;
use crate::models::SubjectRecord;
use crate::traits::SubjectStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const SUBJECT_COLUMNS: &str = "subject_id, facility_id, username, display_name, password_hash, \
     roles, pin_hash, biometric_credential_id, biometric_secret, \
     (extract(epoch from membership_end_at) * 1000)::bigint as membership_end_ms, \
     membership_status";

pub struct PgSubjectStore {
    pub pool: PgPool,
}

impl PgSubjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 通过数据库 URL 建立连接池
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn subject_from_row(row: &PgRow) -> Result<SubjectRecord, StorageError> {
    Ok(SubjectRecord {
        subject_id: row.try_get("subject_id")?,
        facility_id: row.try_get("facility_id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        password_hash: row.try_get("password_hash")?,
        roles: row.try_get("roles")?,
        pin_hash: row.try_get("pin_hash")?,
        biometric_credential_id: row.try_get("biometric_credential_id")?,
        biometric_secret: row.try_get("biometric_secret")?,
        membership_end_ms: row.try_get("membership_end_ms")?,
        membership_status: row.try_get("membership_status")?,
    })
}

#[async_trait::async_trait]
impl SubjectStore for PgSubjectStore {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<SubjectRecord>, StorageError> {
        let sql = format!("select {SUBJECT_COLUMNS} from subjects where username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(subject_from_row).transpose()
    }

    async fn find_subject(&self, subject_id: &str) -> Result<Option<SubjectRecord>, StorageError> {
        let sql = format!("select {SUBJECT_COLUMNS} from subjects where subject_id = $1");
        let row = sqlx::query(&sql)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(subject_from_row).transpose()
    }

    async fn upsert_subject(&self, record: SubjectRecord) -> Result<SubjectRecord, StorageError> {
        sqlx::query(
            "insert into subjects \
             (subject_id, facility_id, username, display_name, password_hash, roles, pin_hash, \
              biometric_credential_id, biometric_secret, membership_end_at, membership_status) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
              case when $10::bigint is null then null else to_timestamp($10::bigint / 1000.0) end, $11) \
             on conflict (subject_id) do update set \
              facility_id = excluded.facility_id, username = excluded.username, \
              display_name = excluded.display_name, password_hash = excluded.password_hash, \
              roles = excluded.roles, pin_hash = excluded.pin_hash, \
              biometric_credential_id = excluded.biometric_credential_id, \
              biometric_secret = excluded.biometric_secret, \
              membership_end_at = excluded.membership_end_at, \
              membership_status = excluded.membership_status",
        )
        .bind(&record.subject_id)
        .bind(&record.facility_id)
        .bind(&record.username)
        .bind(&record.display_name)
        .bind(&record.password_hash)
        .bind(&record.roles)
        .bind(&record.pin_hash)
        .bind(&record.biometric_credential_id)
        .bind(&record.biometric_secret)
        .bind(record.membership_end_ms)
        .bind(&record.membership_status)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_password_hash(
        &self,
        subject_id: &str,
        password_hash: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("update subjects set password_hash = $2 where subject_id = $1")
            .bind(subject_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_refresh_jti(&self, subject_id: &str) -> Result<Option<String>, StorageError> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("select refresh_jti from subjects where subject_id = $1")
                .bind(subject_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    async fn set_refresh_jti(
        &self,
        subject_id: &str,
        refresh_jti: Option<&str>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("update subjects set refresh_jti = $2 where subject_id = $1")
            .bind(subject_id)
            .bind(refresh_jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
