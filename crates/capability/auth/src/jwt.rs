//! 运维与会员端会话 token。
//!
//! access 与 refresh 共用 HS256 密钥，以 `kind` 声明区分；refresh 额外携带 `jti`，
//! 由服务层存库以实现轮换（旧 refresh 一经使用即失效）。

use crate::{AuthError, AuthTokens};
use domain::{CallerContext, Role};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct GateClaims {
    sub: String,
    /// 场馆 ID；管理员为空串。
    fac: String,
    roles: Vec<String>,
    kind: TokenKind,
    iat: u64,
    exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
}

impl GateClaims {
    fn caller(&self) -> CallerContext {
        // 未知角色码直接丢弃，不让伪造的角色进入上下文
        let roles: Vec<Role> = self.roles.iter().filter_map(|code| Role::parse(code)).collect();
        CallerContext::new(self.fac.clone(), self.sub.clone(), roles)
    }
}

pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_seconds: u64,
    refresh_ttl_seconds: u64,
}

impl JwtManager {
    pub fn new(secret: String, access_ttl_seconds: u64, refresh_ttl_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    /// 签发一对 token。`expires_at` 为 access token 过期的 epoch 秒。
    pub fn issue_tokens(&self, ctx: &CallerContext) -> Result<AuthTokens, AuthError> {
        let issued_at = epoch_seconds();
        let refresh_jti = Uuid::new_v4().to_string();
        let access_token = self.sign(ctx, TokenKind::Access, issued_at, None)?;
        let refresh_token = self.sign(
            ctx,
            TokenKind::Refresh,
            issued_at,
            Some(refresh_jti.clone()),
        )?;
        Ok(AuthTokens {
            access_token,
            refresh_token,
            refresh_jti,
            expires_at: issued_at + self.access_ttl_seconds,
        })
    }

    pub fn decode_access(&self, token: &str) -> Result<CallerContext, AuthError> {
        let claims = self.open(token, TokenKind::Access)?;
        Ok(claims.caller())
    }

    /// 解析 refresh token，返回调用方与待核对的 `jti`。
    pub fn decode_refresh_with_jti(
        &self,
        token: &str,
    ) -> Result<(CallerContext, String), AuthError> {
        let claims = self.open(token, TokenKind::Refresh)?;
        let caller = claims.caller();
        let jti = claims.jti.ok_or(AuthError::TokenInvalid)?;
        Ok((caller, jti))
    }

    fn sign(
        &self,
        ctx: &CallerContext,
        kind: TokenKind,
        issued_at: u64,
        jti: Option<String>,
    ) -> Result<String, AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_seconds,
            TokenKind::Refresh => self.refresh_ttl_seconds,
        };
        let claims = GateClaims {
            sub: ctx.subject_id.clone(),
            fac: ctx.facility_id.clone(),
            roles: ctx.roles.iter().map(|role| role.as_str().to_string()).collect(),
            kind,
            iat: issued_at,
            exp: issued_at + ttl,
            jti,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(err.to_string()))
    }

    fn open(&self, token: &str, expected: TokenKind) -> Result<GateClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = jsonwebtoken::decode::<GateClaims>(token, &self.decoding, &validation)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })?
            .claims;
        if claims.kind != expected {
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims)
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

