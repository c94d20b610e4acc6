//! Retention of historical observations.
//!
//! Two independent rules, each sufficient on its own:
//! - Age: observations at or past the configured window are deleted
//!   (inclusive boundary: exactly `window_days` old is already eligible).
//! - Orphans: observations whose target is gone from the registry are
//!   deleted regardless of age.
//!
//! The cleanup loop applies both through the sink's bulk deletes; this
//! module owns only the decision.

use std::collections::HashSet;
use uuid::Uuid;

use crate::monitoring::types::Observation;

/// How long observation history is kept.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Days of history to keep
    pub window_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

impl RetentionPolicy {
    /// Unix timestamp at the edge of the window; anything at or before it
    /// is eligible for deletion.
    pub fn cutoff_unix(&self, now: i64) -> i64 {
        now - self.window_days * 24 * 3600
    }

    /// Whether a single observation is eligible for deletion. The sink's
    /// bulk deletes apply the same two rules in SQL.
    #[allow(dead_code)]
    pub fn selects_for_deletion(
        &self,
        observation: &Observation,
        now: i64,
        valid_targets: &HashSet<Uuid>,
    ) -> bool {
        observation.checked_at <= self.cutoff_unix(now)
            || !valid_targets.contains(&observation.target_id)
    }
}
