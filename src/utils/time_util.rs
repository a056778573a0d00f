use std::time::{SystemTime, UNIX_EPOCH};

/// calculate what time is it since `1970-1-1 00:00:00`, named as [UNIX_EPOCH],
/// in whole seconds (the on-disk timestamp granularity)
pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
