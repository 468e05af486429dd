//! 生物识别断言校验。
//!
//! 终端在本地完成生物特征比对后，用注册时下发的凭证密钥对
//! `subject|credential_id|signed_at_ms` 做 HMAC-SHA256 签名。服务端只校验签名、
//! 凭证引用与签名时间，不接触生物特征本身。

use crate::AuthError;
use domain::BiometricAssertion;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 未来时间容忍度（终端时钟漂移）。
const MAX_FUTURE_TOLERANCE_MS: i64 = 5_000;

/// 已注册的生物识别凭证引用。
#[derive(Debug, Clone)]
pub struct EnrolledCredential<'a> {
    pub credential_id: &'a str,
    /// 十六进制密钥。
    pub secret_hex: &'a str,
}

/// 断言校验结论。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionCheck {
    Verified,
    UnknownCredential,
    Stale,
    BadSignature,
}

fn signing_input(subject_id: &str, credential_id: &str, signed_at_ms: i64) -> String {
    format!("{subject_id}|{credential_id}|{signed_at_ms}")
}

fn mac_for(secret_hex: &str) -> Result<HmacSha256, AuthError> {
    let secret = hex::decode(secret_hex)
        .map_err(|_| AuthError::Internal("biometric secret is not hex".to_string()))?;
    HmacSha256::new_from_slice(&secret).map_err(|err| AuthError::Internal(err.to_string()))
}

/// 生成断言签名（终端侧算法，供注册流程与测试使用）。
pub fn sign_assertion(
    secret_hex: &str,
    subject_id: &str,
    credential_id: &str,
    signed_at_ms: i64,
) -> Result<String, AuthError> {
    let mut mac = mac_for(secret_hex)?;
    mac.update(signing_input(subject_id, credential_id, signed_at_ms).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 校验断言。签名比较为常量时间。
pub fn verify_assertion(
    enrolled: &EnrolledCredential<'_>,
    subject_id: &str,
    assertion: &BiometricAssertion,
    now_ms: i64,
    max_age_ms: i64,
) -> Result<AssertionCheck, AuthError> {
    if assertion.credential_id != enrolled.credential_id {
        return Ok(AssertionCheck::UnknownCredential);
    }
    let age = now_ms - assertion.signed_at_ms;
    if age > max_age_ms || age < -MAX_FUTURE_TOLERANCE_MS {
        return Ok(AssertionCheck::Stale);
    }
    let Ok(signature) = hex::decode(&assertion.signature) else {
        return Ok(AssertionCheck::BadSignature);
    };
    let mut mac = mac_for(enrolled.secret_hex)?;
    mac.update(signing_input(subject_id, &assertion.credential_id, assertion.signed_at_ms).as_bytes());
    match mac.verify_slice(&signature) {
        Ok(()) => Ok(AssertionCheck::Verified),
        Err(_) => Ok(AssertionCheck::BadSignature),
    }
}
