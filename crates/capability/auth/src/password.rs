//! 口令与员工 PIN。
//!
//! 存储值只有两种形态：argon2 PHC 串，或迁移前遗留的明文口令。
//! PIN 没有遗留数据，必须是 argon2。

use crate::AuthError;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand_core::OsRng;
use subtle::ConstantTimeEq;

const PIN_DIGITS: std::ops::RangeInclusive<usize> = 4..=8;

enum StoredSecret<'a> {
    Argon2(PasswordHash<'a>),
    Legacy(&'a str),
}

impl<'a> StoredSecret<'a> {
    fn parse(stored: &'a str) -> Result<Self, AuthError> {
        if !stored.starts_with("$argon2") {
            return Ok(StoredSecret::Legacy(stored));
        }
        PasswordHash::new(stored)
            .map(StoredSecret::Argon2)
            .map_err(|err| AuthError::Internal(err.to_string()))
    }

    fn matches(&self, candidate: &str) -> bool {
        match self {
            StoredSecret::Argon2(hash) => Argon2::default()
                .verify_password(candidate.as_bytes(), hash)
                .is_ok(),
            StoredSecret::Legacy(plain) => plain.as_bytes().ct_eq(candidate.as_bytes()).into(),
        }
    }
}

pub struct PasswordCheck {
    pub verified: bool,
    /// 遗留明文校验通过后生成的 argon2 哈希，由调用方回写。
    pub upgrade_hash: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Internal(err.to_string()))
}

pub fn verify_password_and_maybe_upgrade(
    stored_password_hash: &str,
    password: &str,
) -> Result<PasswordCheck, AuthError> {
    let stored = StoredSecret::parse(stored_password_hash)?;
    let verified = stored.matches(password);
    let upgrade_hash = match stored {
        StoredSecret::Legacy(_) if verified => Some(hash_password(password)?),
        _ => None,
    };
    Ok(PasswordCheck {
        verified,
        upgrade_hash,
    })
}

/// 4-8 位 ASCII 数字。
pub fn is_valid_pin_format(pin: &str) -> bool {
    PIN_DIGITS.contains(&pin.len()) && pin.bytes().all(|byte| byte.is_ascii_digit())
}

/// 格式不合法时不做哈希计算，直接判为不匹配。
pub fn verify_pin(stored_pin_hash: &str, pin: &str) -> Result<bool, AuthError> {
    if !is_valid_pin_format(pin) {
        return Ok(false);
    }
    match StoredSecret::parse(stored_pin_hash)? {
        StoredSecret::Argon2(hash) => Ok(StoredSecret::Argon2(hash).matches(pin)),
        StoredSecret::Legacy(_) => Err(AuthError::Internal("pin hash is not argon2".to_string())),
    }
}
