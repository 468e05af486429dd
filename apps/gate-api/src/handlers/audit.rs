//! 运维审计 handlers
//!
//! - GET /audit-logs
//!
//! 场馆主只能查看自身场馆；管理员可跨场馆，省略 `facilityId` 即查询全部。

use crate::AppState;
use crate::middleware::require_caller;
use crate::utils::response::{audit_log_to_dto, forbidden_error, storage_error};
use crate::utils::validation::normalize_optional;
use api_contract::{ApiResponse, AuditLogDto, AuditLogQueryParams};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::{CallerContext, Role};
use gate_storage::AuditLogQuery;

/// 非管理员的查询范围固定为自身场馆。
fn scoped_facility(ctx: &CallerContext, requested: Option<String>) -> Result<Option<String>, ()> {
    if ctx.is_admin() {
        return Ok(requested);
    }
    if !ctx.has_role(Role::GymOwner) {
        return Err(());
    }
    match requested {
        Some(facility_id) if facility_id != ctx.facility_id => Err(()),
        _ => Ok(Some(ctx.facility_id.clone())),
    }
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(params): Query<AuditLogQueryParams>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let Ok(facility_id) = scoped_facility(&ctx, normalize_optional(params.facility_id)) else {
        return forbidden_error();
    };
    let query = AuditLogQuery {
        facility_id,
        actor: normalize_optional(params.actor),
        action_prefix: normalize_optional(params.action),
        from_ms: params.from,
        to_ms: params.to,
        limit: params.limit,
    };
    match state.audit_log_store.list_audit_logs(&ctx, &query).await {
        Ok(items) => {
            let data: Vec<AuditLogDto> = items.into_iter().map(audit_log_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => storage_error(err),
    }
}
