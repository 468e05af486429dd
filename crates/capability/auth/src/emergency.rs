//! 应急码比较。

use subtle::ConstantTimeEq;

/// 应急码最短长度。
pub const MIN_EMERGENCY_CODE_LEN: usize = 6;

/// 常量时间比较应急码；长度不足的输入直接拒绝。
pub fn emergency_code_matches(configured: &str, presented: &str) -> bool {
    let presented = presented.trim();
    if presented.len() < MIN_EMERGENCY_CODE_LEN {
        return false;
    }
    configured.as_bytes().ct_eq(presented.as_bytes()).into()
}
