/// 一个自然日的毫秒数。
pub const DAY_MS: i64 = 86_400_000;

/// 服务端当前时间（epoch 毫秒）。所有安全判定均以此为准。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
