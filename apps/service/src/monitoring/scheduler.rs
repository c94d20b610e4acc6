use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval, interval_at};
use uuid::Uuid;

use super::alert::AlertTracker;
use super::inspector::{Inspect, InspectError};
use super::probe::Probe;
use crate::notify::{Alert, AlertSender};
use crate::retention::RetentionPolicy;
use crate::store::models::Target;
use crate::store::{ResultSink, TargetRegistry};

/// Cadences and limits for the three loops.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub uptime_interval: Duration,
    pub certificate_interval: Duration,
    pub cleanup_interval: Duration,
    /// Cap on simultaneous outbound probe connections within one tick
    pub max_concurrent_probes: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            uptime_interval: Duration::from_secs(60),
            certificate_interval: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(7 * 24 * 3600),
            max_concurrent_probes: 8,
        }
    }
}

/// Drives the three periodic loops: uptime probing, certificate
/// inspection, and retention cleanup.
///
/// The loops run as independent tasks and share nothing mutable with each
/// other; the alert tracker is touched only by the uptime loop, whose
/// result consumer is sequential, so state updates for one target never
/// interleave. Each loop awaits its own tick body, so a loop never
/// overlaps itself either.
pub struct Scheduler {
    registry: Arc<dyn TargetRegistry>,
    sink: Arc<dyn ResultSink>,
    prober: Arc<dyn Probe>,
    inspector: Arc<dyn Inspect>,
    tracker: Arc<AlertTracker>,
    alerts: AlertSender,
    retention: RetentionPolicy,
    settings: SchedulerSettings,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        sink: Arc<dyn ResultSink>,
        prober: Arc<dyn Probe>,
        inspector: Arc<dyn Inspect>,
        tracker: Arc<AlertTracker>,
        alerts: AlertSender,
        retention: RetentionPolicy,
        settings: SchedulerSettings,
    ) -> Self {
        Self { registry, sink, prober, inspector, tracker, alerts, retention, settings }
    }

    /// Spawn the three loops. The uptime and certificate loops tick
    /// immediately (certificates are swept once at process start); cleanup
    /// waits one full period.
    pub fn spawn_loops(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut timer = interval(scheduler.settings.uptime_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_probed = HashMap::new();
            loop {
                timer.tick().await;
                scheduler.run_uptime_tick(&mut last_probed).await;
            }
        }));

        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut timer = interval(scheduler.settings.certificate_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                scheduler.run_certificate_tick().await;
            }
        }));

        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let period = scheduler.settings.cleanup_interval;
            let mut timer = interval_at(tokio::time::Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                scheduler.run_cleanup_tick().await;
            }
        }));

        handles
    }

    /// One pass of the uptime loop: fetch targets, probe the due ones with
    /// bounded concurrency, evaluate transitions, persist, dispatch alerts.
    ///
    /// `last_probed` maps target UUID to the unix time of its last probe; it
    /// is owned by the loop task and implements the per-target interval.
    pub async fn run_uptime_tick(&self, last_probed: &mut HashMap<Uuid, i64>) {
        let targets = match self.registry.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!("failed to fetch target list, skipping uptime tick: {e:#}");
                return;
            }
        };

        let valid: HashSet<Uuid> = targets.iter().map(|t| t.uuid).collect();
        self.tracker.retain_targets(&valid);
        last_probed.retain(|uuid, _| valid.contains(uuid));

        let now = chrono::Utc::now().timestamp();
        let due: Vec<Target> = targets
            .into_iter()
            .filter(|target| {
                last_probed
                    .get(&target.uuid)
                    .map_or(true, |last| now - last >= target.effective_interval_seconds() as i64)
            })
            .collect();

        if due.is_empty() {
            return;
        }
        tracing::debug!("probing {} targets", due.len());

        let mut results = futures::stream::iter(due.into_iter().map(|target| {
            let prober = Arc::clone(&self.prober);
            async move {
                let observation = prober.probe(&target).await;
                (target, observation)
            }
        }))
        .buffer_unordered(self.settings.max_concurrent_probes.max(1));

        while let Some((target, observation)) = results.next().await {
            last_probed.insert(target.uuid, observation.checked_at);

            let decision = self.tracker.evaluate(observation.target_id, observation.is_up);

            if let Err(e) = self.sink.append_observation(&observation).await {
                tracing::warn!(target_name = %target.name, "failed to persist observation: {e:#}");
            }

            if decision.warrants_alert() {
                self.alerts.dispatch(Alert {
                    target_name: target.name.clone(),
                    target_url: target.url.clone(),
                    is_up: observation.is_up,
                    response_time_ms: observation.response_time_ms,
                });
            }
        }
    }

    /// One pass of the certificate loop. Handshake failures are recorded as
    /// failure-state snapshots; a target without a usable host is skipped
    /// without disturbing the rest of the batch.
    pub async fn run_certificate_tick(&self) {
        let targets = match self.registry.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!("failed to fetch target list, skipping certificate tick: {e:#}");
                return;
            }
        };

        tracing::debug!("inspecting certificates for {} targets", targets.len());

        for target in targets {
            match self.inspector.inspect(target.uuid, &target.url).await {
                Ok(record) => {
                    if let Some(error) = &record.error {
                        tracing::debug!(
                            target_name = %target.name,
                            "certificate inspection recorded failure state: {error}"
                        );
                    }
                    if let Err(e) = self.sink.upsert_certificate(&record).await {
                        tracing::warn!(
                            target_name = %target.name,
                            "failed to persist certificate record: {e:#}"
                        );
                    }
                }
                Err(InspectError::InvalidTarget(url)) => {
                    tracing::warn!(
                        target_name = %target.name,
                        "skipping certificate inspection, no usable host in {url}"
                    );
                }
            }
        }
    }

    /// One pass of the cleanup loop: age rule first, then the orphan rule.
    /// Counts are logged; individual identities are not.
    pub async fn run_cleanup_tick(&self) {
        let cutoff = self.retention.cutoff_unix(chrono::Utc::now().timestamp());

        match self.sink.delete_observations_older_than(cutoff).await {
            Ok(count) => tracing::info!("retention cleanup removed {count} expired observations"),
            Err(e) => tracing::warn!("expired-observation cleanup failed: {e:#}"),
        }

        match self.registry.list_targets().await {
            Ok(targets) => {
                let valid: Vec<Uuid> = targets.iter().map(|t| t.uuid).collect();
                match self.sink.delete_observations_with_target_not_in(&valid).await {
                    Ok(count) => {
                        tracing::info!("retention cleanup removed {count} orphaned observations");
                    }
                    Err(e) => tracing::warn!("orphaned-observation cleanup failed: {e:#}"),
                }
            }
            Err(e) => {
                tracing::warn!("skipping orphan sweep, target list unavailable: {e:#}");
            }
        }
    }
}
