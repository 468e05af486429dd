//! 闸机执行器抽象。

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("actuation failed: {0}")]
pub struct ActuationError(pub String);

/// 放行后驱动闸机开门。调用方负责超时。
#[async_trait]
pub trait GateActuator: Send + Sync {
    async fn open(&self, device_id: &str, hold_ms: u64) -> Result<(), ActuationError>;
}

/// 空执行器：设备通过 `/devices/validate` 的应答自行开门时使用。
#[derive(Debug, Default)]
pub struct NoopActuator;

#[async_trait]
impl GateActuator for NoopActuator {
    async fn open(&self, _device_id: &str, _hold_ms: u64) -> Result<(), ActuationError> {
        Ok(())
    }
}
