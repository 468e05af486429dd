//! 扫码内容解析。
//!
//! 两种格式：
//! - 场馆二维码 JSON：`{"type":"gym_owner","gymOwnerId":..,"gymName":..,"timestamp":..}`，
//!   `timestamp` 只作参考，安全判断一律使用服务端时间；
//! - 闸机转发的会员码：`{facilityId}:{memberId}`。

use serde::Deserialize;

const GYM_OWNER_QR_TYPE: &str = "gym_owner";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GymQrPayload {
    #[serde(rename = "type")]
    kind: String,
    gym_owner_id: String,
    #[serde(default)]
    gym_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedCode {
    pub facility_id: String,
    pub gym_name: Option<String>,
    /// 会员码携带的会员 ID；场馆二维码为 `None`。
    pub member_id: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("empty payload")]
    Empty,
    #[error("unsupported qr type: {0}")]
    UnsupportedType(String),
    #[error("malformed payload")]
    Malformed,
}

/// 解析扫码原文。
pub fn parse_scanned_code(raw: &str) -> Result<ScannedCode, ScanError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScanError::Empty);
    }
    if raw.starts_with('{') {
        let payload: GymQrPayload =
            serde_json::from_str(raw).map_err(|_| ScanError::Malformed)?;
        if payload.kind != GYM_OWNER_QR_TYPE {
            return Err(ScanError::UnsupportedType(payload.kind));
        }
        let facility_id = payload.gym_owner_id.trim();
        if facility_id.is_empty() {
            return Err(ScanError::Malformed);
        }
        return Ok(ScannedCode {
            facility_id: facility_id.to_string(),
            gym_name: payload.gym_name,
            member_id: None,
        });
    }
    parse_member_code(raw)
        .map(|(facility_id, member_id)| ScannedCode {
            facility_id,
            gym_name: None,
            member_id: Some(member_id),
        })
        .ok_or(ScanError::Malformed)
}

/// 解析 `{facilityId}:{memberId}`。
pub fn parse_member_code(raw: &str) -> Option<(String, String)> {
    let (facility_id, member_id) = raw.trim().split_once(':')?;
    let facility_id = facility_id.trim();
    let member_id = member_id.trim();
    if facility_id.is_empty() || member_id.is_empty() || member_id.contains(':') {
        return None;
    }
    Some((facility_id.to_string(), member_id.to_string()))
}
