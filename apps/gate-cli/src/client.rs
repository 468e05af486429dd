//! `/devices/validate` 客户端
//!
//! 以闸机身份调用服务端：请求头带 `x-device-key`，请求体为设备 ID 与扫码原文。

use api_contract::{ApiResponse, DeviceDecisionDto, DeviceValidateRequest};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

const DEVICE_KEY_HEADER: &str = "x-device-key";
const VALIDATE_PATH: &str = "/devices/validate";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("config: {0}")]
    Config(String),
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {code}")]
    Rejected { status: StatusCode, code: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub struct ValidateClient {
    http: reqwest::Client,
    endpoint: String,
    device_key: String,
}

impl ValidateClient {
    pub fn new(server: &str, device_key: String, timeout: Duration) -> Result<Self, CliError> {
        let server = server.trim().trim_end_matches('/');
        if !(server.starts_with("http://") || server.starts_with("https://")) {
            return Err(CliError::Config(format!("invalid server url: {server}")));
        }
        if device_key.trim().is_empty() {
            return Err(CliError::Config("device key is empty".to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{server}{VALIDATE_PATH}"),
            device_key,
        })
    }

    /// 提交一次扫码。服务端对业务拒绝同样返回 200，非 200 视为系统错误。
    pub async fn validate(
        &self,
        device_id: &str,
        payload: &str,
    ) -> Result<DeviceDecisionDto, CliError> {
        let body = DeviceValidateRequest {
            device_id: device_id.to_string(),
            credential_payload: payload.to_string(),
        };
        let response = self
            .http
            .post(&self.endpoint)
            .header(DEVICE_KEY_HEADER, &self.device_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let envelope: ApiResponse<DeviceDecisionDto> = serde_json::from_slice(&bytes)
            .map_err(|err| CliError::Malformed(err.to_string()))?;
        if !status.is_success() {
            let code = envelope
                .error
                .map(|error| error.code)
                .unwrap_or_else(|| "UNKNOWN".to_string());
            return Err(CliError::Rejected { status, code });
        }
        envelope
            .data
            .ok_or_else(|| CliError::Malformed("missing data".to_string()))
    }
}
