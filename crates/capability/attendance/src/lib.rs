//! 签到流水：每次会员放行追加一条记录，按 `attempt_id` 幂等。

mod stats;

use chrono::FixedOffset;
use domain::{AttemptOrigin, CallerContext, Role};
use gate_storage::{
    AccessAttemptRecord, AccessAttemptStore, AttendanceRecord, AttendanceStore,
    AttendanceWriteResult, SubjectStore,
};
use gate_telemetry::record_attendance_recorded;
use std::sync::Arc;
use tracing::info;

pub use stats::{AVERAGE_WINDOW_WEEKS, AttendanceStats, compute_stats, facility_offset};

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("attempt not found")]
    NotFound,
    #[error("attempt was not granted")]
    NotGranted,
    #[error("subject is not a member")]
    NotMember,
    #[error("forbidden")]
    Forbidden,
    #[error("storage error: {0}")]
    Storage(String),
}

fn storage_err(err: gate_storage::StorageError) -> AttendanceError {
    AttendanceError::Storage(err.to_string())
}

/// 同一次放行总是得到同一个签到 ID。
pub fn attendance_id_for(attempt_id: &str) -> String {
    let name = format!("attendance:attempt:{}", attempt_id);
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

pub struct AttendanceLedger {
    attendance_store: Arc<dyn AttendanceStore>,
    attempt_store: Arc<dyn AccessAttemptStore>,
    subject_store: Arc<dyn SubjectStore>,
    offset: FixedOffset,
}

impl AttendanceLedger {
    pub fn new(
        attendance_store: Arc<dyn AttendanceStore>,
        attempt_store: Arc<dyn AccessAttemptStore>,
        subject_store: Arc<dyn SubjectStore>,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            attendance_store,
            attempt_store,
            subject_store,
            offset: facility_offset(utc_offset_minutes),
        }
    }

    /// 追加签到；同一 `attempt_id` 重复写入返回既有记录。
    pub async fn record(
        &self,
        attempt_id: &str,
        member_id: &str,
        facility_id: &str,
        ts_ms: i64,
    ) -> Result<AttendanceWriteResult, AttendanceError> {
        let record = AttendanceRecord {
            attendance_id: attendance_id_for(attempt_id),
            attempt_id: attempt_id.to_string(),
            member_id: member_id.to_string(),
            facility_id: facility_id.to_string(),
            ts_ms,
        };
        let written = self
            .attendance_store
            .append_attendance(record)
            .await
            .map_err(storage_err)?;
        if written.inserted {
            record_attendance_recorded();
            info!(
                target: "gate.attendance",
                attempt_id = %attempt_id,
                member_id = %member_id,
                facility_id = %facility_id,
                "attendance_recorded"
            );
        }
        Ok(written)
    }

    /// 放行后的签到确认。只接受服务端判定为放行的会员记录。
    pub async fn mark(
        &self,
        ctx: &CallerContext,
        attempt_id: &str,
    ) -> Result<AttendanceWriteResult, AttendanceError> {
        let attempt = self
            .attempt_store
            .find_attempt(attempt_id)
            .await
            .map_err(storage_err)?
            .ok_or(AttendanceError::NotFound)?;
        let is_self = ctx.subject_id == attempt.subject_id;
        let is_facility_staff = ctx.is_staff() && ctx.can_access_facility(&attempt.facility_id);
        if !is_self && !is_facility_staff && !ctx.is_admin() {
            return Err(AttendanceError::Forbidden);
        }
        if !attempt.decision.is_granted() || attempt.origin != AttemptOrigin::Server {
            return Err(AttendanceError::NotGranted);
        }
        if attempt.device_id.is_some() {
            let superseded = self
                .attempt_store
                .find_attempt(&AccessAttemptRecord::actuation_failure_id(&attempt.attempt_id))
                .await
                .map_err(storage_err)?;
            if superseded.is_some() {
                return Err(AttendanceError::NotGranted);
            }
        }
        let subject = self
            .subject_store
            .find_subject(&attempt.subject_id)
            .await
            .map_err(storage_err)?
            .ok_or(AttendanceError::NotMember)?;
        if !subject.has_role(Role::Member) {
            return Err(AttendanceError::NotMember);
        }
        self.record(
            &attempt.attempt_id,
            &attempt.subject_id,
            &attempt.facility_id,
            attempt.ts_ms,
        )
        .await
    }

    pub async fn stats_for(
        &self,
        member_id: &str,
        now_ms: i64,
    ) -> Result<AttendanceStats, AttendanceError> {
        let records = self
            .attendance_store
            .list_attendance(member_id, None)
            .await
            .map_err(storage_err)?;
        let timestamps: Vec<i64> = records.iter().map(|record| record.ts_ms).collect();
        Ok(compute_stats(&timestamps, now_ms, self.offset))
    }

    pub async fn list_for(
        &self,
        member_id: &str,
        from_ms: Option<i64>,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        self.attendance_store
            .list_attendance(member_id, from_ms)
            .await
            .map_err(storage_err)
    }
}
