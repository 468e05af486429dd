//! 会员状态与签到 handlers
//!
//! - GET /members/{id}/membership
//! - GET /members/{id}/attendance
//! - GET /members/{id}/attendance/stats
//!
//! 本人、所属场馆员工与管理员可读。

use crate::AppState;
use crate::middleware::require_caller;
use crate::utils::response::{
    attendance_error, attendance_to_dto, forbidden_error, membership_error, membership_to_dto,
    stats_to_dto,
};
use api_contract::{ApiResponse, AttendanceRecordDto};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::{CallerContext, now_epoch_ms};
use gate_membership::MemberMembership;

#[derive(serde::Deserialize)]
pub struct MemberPath {
    member_id: String,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct AttendanceQuery {
    from: Option<i64>,
}

fn can_read_member(ctx: &CallerContext, membership: &MemberMembership) -> bool {
    ctx.subject_id == membership.member_id
        || ctx.is_admin()
        || (ctx.is_staff() && ctx.can_access_facility(&membership.facility_id))
}

/// 鉴权并取会员视图（走 TTL 缓存）。
async fn require_member_scope(
    state: &AppState,
    headers: &HeaderMap,
    member_id: &str,
    now_ms: i64,
) -> Result<MemberMembership, Response> {
    let ctx = require_caller(state, headers)?;
    let membership = state
        .membership
        .state_for(member_id, now_ms)
        .await
        .map_err(membership_error)?;
    if !can_read_member(&ctx, &membership) {
        return Err(forbidden_error());
    }
    Ok(membership)
}

pub async fn get_membership(
    State(state): State<AppState>,
    Path(path): Path<MemberPath>,
    headers: HeaderMap,
) -> Response {
    let membership =
        match require_member_scope(&state, &headers, &path.member_id, now_epoch_ms()).await {
            Ok(membership) => membership,
            Err(response) => return response,
        };
    (
        StatusCode::OK,
        Json(ApiResponse::success(membership_to_dto(&membership))),
    )
        .into_response()
}

pub async fn list_attendance(
    State(state): State<AppState>,
    Path(path): Path<MemberPath>,
    Query(query): Query<AttendanceQuery>,
    headers: HeaderMap,
) -> Response {
    let membership =
        match require_member_scope(&state, &headers, &path.member_id, now_epoch_ms()).await {
            Ok(membership) => membership,
            Err(response) => return response,
        };
    match state
        .ledger
        .list_for(&membership.member_id, query.from)
        .await
    {
        Ok(items) => {
            let data: Vec<AttendanceRecordDto> = items
                .into_iter()
                .map(|record| attendance_to_dto(record, false))
                .collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => attendance_error(err),
    }
}

pub async fn attendance_stats(
    State(state): State<AppState>,
    Path(path): Path<MemberPath>,
    headers: HeaderMap,
) -> Response {
    let now_ms = now_epoch_ms();
    let membership = match require_member_scope(&state, &headers, &path.member_id, now_ms).await {
        Ok(membership) => membership,
        Err(response) => return response,
    };
    match state.ledger.stats_for(&membership.member_id, now_ms).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(ApiResponse::success(stats_to_dto(
                &membership.member_id,
                stats,
            ))),
        )
            .into_response(),
        Err(err) => attendance_error(err),
    }
}
