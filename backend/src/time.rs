use anyhow::anyhow;

/// Server wall clock in unix milliseconds.
pub fn now_ms() -> anyhow::Result<u64> {
    epoch_ms(chrono::Utc::now().timestamp_millis())
}

/// Refuses instants before the unix epoch instead of clamping them.
fn epoch_ms(ts_ms: i64) -> anyhow::Result<u64> {
    u64::try_from(ts_ms).map_err(|_| anyhow!("system clock before unix epoch: {ts_ms}ms"))
}
