//! 认证能力：运维登录与 JWT、口令 / PIN 哈希、生物识别断言、应急码。

mod biometric;
mod emergency;
mod jwt;
mod password;

use domain::CallerContext;
use gate_storage::{SubjectRecord, SubjectStore};
use std::sync::Arc;
use tracing::{info, warn};

pub use biometric::{AssertionCheck, EnrolledCredential, sign_assertion, verify_assertion};
pub use emergency::{MIN_EMERGENCY_CODE_LEN, emergency_code_matches};
pub use jwt::JwtManager;
pub use password::{
    PasswordCheck, hash_password, is_valid_pin_format, verify_password_and_maybe_upgrade,
    verify_pin,
};

/// 认证相关错误。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("internal error: {0}")]
    Internal(String),
}

/// 登录/刷新返回的 token 结构。
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_jti: String,
    pub expires_at: u64,
}

fn storage_failure(err: gate_storage::StorageError) -> AuthError {
    AuthError::Internal(err.to_string())
}

/// 登录、刷新与 access token 校验。
pub struct AuthService {
    subject_store: Arc<dyn SubjectStore>,
    jwt: JwtManager,
}

impl AuthService {
    pub fn new(subject_store: Arc<dyn SubjectStore>, jwt: JwtManager) -> Self {
        Self { subject_store, jwt }
    }

    /// 未知用户与口令错误同样返回 `InvalidCredentials`；遗留明文口令校验通过后回写 argon2。
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(SubjectRecord, AuthTokens), AuthError> {
        let Some(subject) = self
            .subject_store
            .find_by_username(username)
            .await
            .map_err(storage_failure)?
        else {
            warn!(target: "gate.auth", username = %username, "login_rejected_unknown_user");
            return Err(AuthError::InvalidCredentials);
        };
        let check = verify_password_and_maybe_upgrade(&subject.password_hash, password)?;
        if !check.verified {
            warn!(target: "gate.auth", subject_id = %subject.subject_id, "login_rejected_bad_password");
            return Err(AuthError::InvalidCredentials);
        }
        if let Some(upgraded) = check.upgrade_hash {
            let written = self
                .subject_store
                .update_password_hash(&subject.subject_id, &upgraded)
                .await
                .map_err(storage_failure)?;
            if !written {
                return Err(AuthError::Internal("password hash upgrade not applied".to_string()));
            }
            info!(target: "gate.auth", subject_id = %subject.subject_id, "password_hash_upgraded");
        }
        let tokens = self.issue_and_bind(&subject.to_caller_context()).await?;
        info!(target: "gate.auth", subject_id = %subject.subject_id, "login_succeeded");
        Ok((subject, tokens))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<CallerContext, AuthError> {
        self.jwt.decode_access(token)
    }

    /// refresh 只能用一次：库中记录的 `jti` 必须与 token 一致，换发后立即替换。
    pub async fn refresh(&self, token: &str) -> Result<AuthTokens, AuthError> {
        let (ctx, jti) = self.jwt.decode_refresh_with_jti(token)?;
        let current = self
            .subject_store
            .get_refresh_jti(&ctx.subject_id)
            .await
            .map_err(storage_failure)?;
        if current.as_deref() != Some(jti.as_str()) {
            warn!(target: "gate.auth", subject_id = %ctx.subject_id, "refresh_token_replayed");
            return Err(AuthError::TokenInvalid);
        }
        self.issue_and_bind(&ctx).await
    }

    async fn issue_and_bind(&self, ctx: &CallerContext) -> Result<AuthTokens, AuthError> {
        let tokens = self.jwt.issue_tokens(ctx)?;
        let bound = self
            .subject_store
            .set_refresh_jti(&ctx.subject_id, Some(&tokens.refresh_jti))
            .await
            .map_err(storage_failure)?;
        if !bound {
            return Err(AuthError::Internal("refresh token binding not applied".to_string()));
        }
        Ok(tokens)
    }
}
