use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status codes that count as "up": the server answered, even if it refused
/// us. [200,400) plus 403 (forbidden but alive) and 429 (rate limited but
/// alive).
pub fn status_indicates_up(status_code: u16) -> bool {
    (200..400).contains(&status_code) || status_code == 403 || status_code == 429
}

/// Whole days between `now` and `valid_to`, rounded toward negative
/// infinity. An expired certificate reports negative days.
pub fn days_remaining(valid_to: i64, now: i64) -> i64 {
    (valid_to - now).div_euclid(24 * 3600)
}

/// Outcome of a single uptime probe. Append-only: created exactly once per
/// probe and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// UUID of the target that was probed
    pub target_id: Uuid,

    /// Derived up/down classification (not a raw transport signal)
    pub is_up: bool,

    /// HTTP status code, or 0 when the request failed at the transport level
    pub status_code: u16,

    /// Wall-clock time from request start to response headers (or failure)
    pub response_time_ms: i64,

    /// Unix timestamp of the probe
    pub checked_at: i64,
}

impl Observation {
    /// Start an observation for a target; callers complete it with
    /// [`completed`](Self::completed) or
    /// [`transport_failure`](Self::transport_failure).
    pub fn new(target_id: Uuid) -> Self {
        Self {
            target_id,
            is_up: false,
            status_code: 0,
            response_time_ms: 0,
            checked_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The request completed with an HTTP response; classify it.
    pub fn completed(mut self, status_code: u16, response_time_ms: i64) -> Self {
        self.is_up = status_indicates_up(status_code);
        self.status_code = status_code;
        self.response_time_ms = response_time_ms;
        self
    }

    /// The request failed below HTTP (DNS, connect, TLS, timeout).
    pub fn transport_failure(mut self, response_time_ms: i64) -> Self {
        self.is_up = false;
        self.status_code = 0;
        self.response_time_ms = response_time_ms;
        self
    }
}

/// Snapshot of a target's TLS certificate state. One logical record per
/// target; the latest inspection overwrites the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub target_id: Uuid,

    /// Host the handshake was performed against (port kept if explicit)
    pub host: String,

    /// notBefore of the leaf certificate, unix seconds
    pub valid_from: Option<i64>,

    /// notAfter of the leaf certificate, unix seconds
    pub valid_to: Option<i64>,

    /// Issuer common name, or the full issuer DN when the CN is empty
    pub issuer: Option<String>,

    /// Set when the handshake failed or no certificate was presented; a
    /// populated error is still a successful inspection of a failure state
    pub error: Option<String>,

    pub checked_at: i64,

    /// Whole days until expiry, negative once expired
    pub days_left: Option<i64>,
}

impl CertificateRecord {
    /// Record a handshake that failed (or presented nothing usable).
    pub fn failure(target_id: Uuid, host: String, error: String) -> Self {
        Self {
            target_id,
            host,
            valid_from: None,
            valid_to: None,
            issuer: None,
            error: Some(error),
            checked_at: chrono::Utc::now().timestamp(),
            days_left: None,
        }
    }

    /// Record a successfully inspected leaf certificate.
    pub fn from_validity(
        target_id: Uuid,
        host: String,
        valid_from: i64,
        valid_to: i64,
        issuer: String,
    ) -> Self {
        let checked_at = chrono::Utc::now().timestamp();
        Self {
            target_id,
            host,
            valid_from: Some(valid_from),
            valid_to: Some(valid_to),
            issuer: Some(issuer),
            error: None,
            checked_at,
            days_left: Some(days_remaining(valid_to, checked_at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_status_range_is_up() {
        for code in [200, 201, 301, 399] {
            assert!(status_indicates_up(code), "{code} should classify as up");
        }
    }

    #[test]
    fn forbidden_and_rate_limited_are_up() {
        assert!(status_indicates_up(403));
        assert!(status_indicates_up(429));
    }

    #[test]
    fn server_errors_are_down() {
        for code in [404, 500, 503] {
            assert!(!status_indicates_up(code), "{code} should classify as down");
        }
    }

    #[test]
    fn transport_failure_yields_down_with_zero_code() {
        let obs = Observation::new(Uuid::new_v4()).transport_failure(120);
        assert!(!obs.is_up);
        assert_eq!(obs.status_code, 0);
        assert_eq!(obs.response_time_ms, 120);
    }

    #[test]
    fn completed_observation_classifies_status() {
        let up = Observation::new(Uuid::new_v4()).completed(204, 35);
        assert!(up.is_up);
        assert_eq!(up.status_code, 204);

        let down = Observation::new(Uuid::new_v4()).completed(503, 35);
        assert!(!down.is_up);
    }

    #[test]
    fn days_remaining_floors() {
        // 45 days and one hour out is still 45 whole days
        assert_eq!(days_remaining(45 * 86_400 + 3_600, 0), 45);
        // exactly 10 days
        assert_eq!(days_remaining(10 * 86_400, 0), 10);
        // expired an hour ago rounds down to -1, not up to 0
        assert_eq!(days_remaining(-3_600, 0), -1);
    }
}
