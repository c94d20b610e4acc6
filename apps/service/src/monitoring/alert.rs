use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

/// What an observation means for alerting, given the target's previous
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// Steady state, or a target seen healthy for the first time
    None,
    /// Up -> Down transition
    BecameDown,
    /// Down -> Up recovery
    BecameUp,
    /// Never-observed target whose very first probe came back down
    FirstObservationDown,
}

impl AlertDecision {
    pub fn warrants_alert(self) -> bool {
        self != AlertDecision::None
    }
}

/// Per-target up/down memory used to deduplicate alerts.
///
/// State lives only in memory and starts empty on every process start, so
/// the first observation after a restart is always evaluated as if the
/// target had never been seen. Entries are keyed per target; updates to one
/// target never contend with updates to another.
pub struct AlertTracker {
    last_known_up: DashMap<Uuid, bool>,
}

impl Default for AlertTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertTracker {
    pub fn new() -> Self {
        Self { last_known_up: DashMap::new() }
    }

    /// Fold one observation into the target's state and decide whether it
    /// constitutes a reportable transition.
    ///
    /// The state update is the terminal effect of every call: exactly one
    /// mutation per completed probe, applied whether or not an alert fires.
    /// The entry guard is held across read and write, so two evaluations for
    /// the same target cannot interleave.
    pub fn evaluate(&self, target_id: Uuid, is_up: bool) -> AlertDecision {
        match self.last_known_up.entry(target_id) {
            Entry::Occupied(mut entry) => {
                let was_up = *entry.get();
                entry.insert(is_up);
                match (was_up, is_up) {
                    (true, false) => AlertDecision::BecameDown,
                    (false, true) => AlertDecision::BecameUp,
                    _ => AlertDecision::None,
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(is_up);
                if is_up {
                    AlertDecision::None
                } else {
                    AlertDecision::FirstObservationDown
                }
            }
        }
    }

    /// Drop state for targets no longer in the registry.
    pub fn retain_targets(&self, valid: &std::collections::HashSet<Uuid>) {
        self.last_known_up.retain(|id, _| valid.contains(id));
    }
}
