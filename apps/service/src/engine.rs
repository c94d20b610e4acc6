//! Engine wiring - builds the monitoring components from configuration and
//! owns their lifecycle.
//!
//! The engine talks to the outside world through the storage traits and the
//! notifier only; which implementations back them is the caller's choice.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::monitoring::alert::AlertTracker;
use crate::monitoring::inspector::{CertificateInspector, Inspect};
use crate::monitoring::probe::{HttpProber, Probe};
use crate::monitoring::scheduler::{Scheduler, SchedulerSettings};
use crate::notify::{AlertDispatcher, LogNotifier, Notifier, WebhookNotifier};
use crate::retention::RetentionPolicy;
use crate::store::{ResultSink, TargetRegistry};

pub struct Engine {
    dispatcher: AlertDispatcher,
    loop_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Engine {
    /// Build every component and spawn the scheduler loops.
    pub fn start(
        config: &Config,
        registry: Arc<dyn TargetRegistry>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self> {
        let prober: Arc<dyn Probe> = Arc::new(HttpProber::new(config.probing.timeout_seconds)?);
        let inspector: Arc<dyn Inspect> =
            Arc::new(CertificateInspector::new(config.certificates.timeout_seconds)?);
        let tracker = Arc::new(AlertTracker::new());

        let notifier: Arc<dyn Notifier> = if config.alerts.webhook_url.is_empty() {
            tracing::info!("no alert webhook configured, transitions will only be logged");
            Arc::new(LogNotifier)
        } else {
            Arc::new(WebhookNotifier::new(
                config.alerts.webhook_url.clone(),
                config.alerts.timeout_seconds,
            )?)
        };
        let dispatcher = AlertDispatcher::start(notifier, config.alerts.queue_capacity);

        let scheduler = Arc::new(Scheduler::new(
            registry,
            sink,
            prober,
            inspector,
            tracker,
            dispatcher.sender(),
            RetentionPolicy { window_days: config.retention.window_days },
            SchedulerSettings {
                uptime_interval: Duration::from_secs(config.scheduler.uptime_interval_seconds),
                certificate_interval: Duration::from_secs(
                    config.scheduler.certificate_interval_seconds,
                ),
                cleanup_interval: Duration::from_secs(config.scheduler.cleanup_interval_seconds),
                max_concurrent_probes: config.probing.max_concurrent,
            },
        ));

        let loop_handles = scheduler.spawn_loops();
        tracing::info!("monitoring engine started ({} loops)", loop_handles.len());

        Ok(Self { dispatcher, loop_handles })
    }

    /// Stop the loops and drain in-flight alert deliveries.
    pub async fn shutdown(mut self) {
        // Wait for each aborted loop to actually terminate so its handle on
        // the alert queue is released before the drain below.
        for handle in self.loop_handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        self.dispatcher.shutdown().await;
        tracing::info!("monitoring engine stopped");
    }
}
