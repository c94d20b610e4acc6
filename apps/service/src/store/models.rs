use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Target model - one monitored endpoint.
///
/// The registry owner is responsible for keeping `interval_seconds` at or
/// above the floor; the engine trusts the stored value but clamps through
/// [`effective_interval_seconds`](Self::effective_interval_seconds) so a
/// zero (or otherwise too small) interval cannot produce a hot loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    pub url: String,
    pub interval_seconds: u64,
    pub owner: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Target {
    /// Minimum supported check interval.
    pub const MIN_INTERVAL_SECONDS: u64 = 60;

    /// Create a new target with the default check interval.
    pub fn new(name: String, url: String) -> Self {
        let now = SystemTime::now();
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name,
            url,
            interval_seconds: Self::MIN_INTERVAL_SECONDS,
            owner: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check interval clamped to the floor.
    pub fn effective_interval_seconds(&self) -> u64 {
        self.interval_seconds.max(Self::MIN_INTERVAL_SECONDS)
    }

    /// Convert SystemTime to a unix timestamp
    pub fn timestamp_to_i64(time: SystemTime) -> i64 {
        time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
    }

    /// Convert a unix timestamp to SystemTime
    pub fn i64_to_timestamp(timestamp: i64) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::from_secs(timestamp.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_floor_tolerates_zero() {
        let mut target = Target::new("a".to_string(), "https://a.example".to_string());
        target.interval_seconds = 0;
        assert_eq!(target.effective_interval_seconds(), 60);

        target.interval_seconds = 30;
        assert_eq!(target.effective_interval_seconds(), 60);

        target.interval_seconds = 300;
        assert_eq!(target.effective_interval_seconds(), 300);
    }
}
