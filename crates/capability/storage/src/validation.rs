//! 场馆作用域校验
//!
//! 运维读接口（设备列表、审计查询）都先经过这里：管理员可跨场馆，
//! 其余角色只能读取自身场馆的数据。

use crate::error::StorageError;
use domain::CallerContext;

/// 验证调用方主体非空。
pub fn ensure_subject(ctx: &CallerContext) -> Result<(), StorageError> {
    if ctx.subject_id.is_empty() {
        return Err(StorageError::new("subject_id required"));
    }
    Ok(())
}

/// 验证场馆归属。
pub fn ensure_facility_scope(ctx: &CallerContext, facility_id: &str) -> Result<(), StorageError> {
    ensure_subject(ctx)?;
    if !ctx.can_access_facility(facility_id) {
        return Err(StorageError::new("facility scope mismatch"));
    }
    Ok(())
}

/// 未指定场馆的全量查询仅限管理员。
pub fn ensure_facility_filter(
    ctx: &CallerContext,
    facility_id: Option<&str>,
) -> Result<(), StorageError> {
    match facility_id {
        Some(facility_id) => ensure_facility_scope(ctx, facility_id),
        None if ctx.is_admin() => Ok(()),
        None => Err(StorageError::new("facility scope required")),
    }
}
