pub mod alert;
/// Monitoring engine module
///
/// This module is responsible for:
/// - Probing targets over HTTP(S) and classifying the result
/// - Inspecting TLS certificates
/// - Deciding which observations constitute reportable transitions
/// - Driving the periodic uptime / certificate / cleanup loops
pub mod inspector;
pub mod probe;
pub mod scheduler;
pub mod types;

pub use alert::{AlertDecision, AlertTracker};
pub use inspector::{CertificateInspector, Inspect, InspectError};
pub use probe::{HttpProber, Probe};
pub use scheduler::{Scheduler, SchedulerSettings};
pub use types::{CertificateRecord, Observation};
