//! 输入验证辅助函数
//!
//! - normalize_required：必填字段，去除首尾空格后不得为空
//! - normalize_optional：可选字段，提供时同样去除空格；空串视为未提供

use crate::utils::response::bad_request_error;
use axum::response::Response;

/// 验证必填字段，去除空格并检查非空
pub fn normalize_required(value: String, field: &str) -> Result<String, Response> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request_error(format!("{field} required")));
    }
    Ok(trimmed.to_string())
}

/// 可选字段：空串与缺省等价
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_rejects_blank() {
        assert_eq!(
            normalize_required("  gym-1 ".to_string(), "facilityId").expect("value"),
            "gym-1"
        );
        assert!(normalize_required("   ".to_string(), "facilityId").is_err());
    }

    #[test]
    fn optional_treats_blank_as_missing() {
        assert_eq!(normalize_optional(Some(" ".to_string())), None);
        assert_eq!(
            normalize_optional(Some(" GATE-01 ".to_string())).as_deref(),
            Some("GATE-01")
        );
        assert_eq!(normalize_optional(None), None);
    }
}
