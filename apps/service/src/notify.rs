//! Alert delivery.
//!
//! The scheduler never talks to a webhook directly: qualifying transitions
//! are handed to a bounded queue and delivered by a single worker task, so
//! a slow or failing notification endpoint cannot stall the uptime loop.
//! Shutdown drains whatever is still queued.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One reportable transition, ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub target_name: String,
    pub target_url: String,
    pub is_up: bool,
    pub response_time_ms: i64,
}

/// Delivery of one alert. Failures are surfaced to the dispatch worker,
/// which logs and moves on; they never propagate into the scheduler.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Notifier that only writes to the log. Used when no webhook is
/// configured, so transitions still leave a trace.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        if alert.is_up {
            tracing::info!(
                target_name = %alert.target_name,
                response_time_ms = alert.response_time_ms,
                "target recovered"
            );
        } else {
            tracing::warn!(
                target_name = %alert.target_name,
                url = %alert.target_url,
                "target is down"
            );
        }
        Ok(())
    }
}

/// Webhook notifier posting a Discord-compatible embed payload.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self { client, webhook_url })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let (color, status, emoji) = if alert.is_up {
            (0x00ff00, "ONLINE", "\u{2705}")
        } else {
            (0xff0000, "OFFLINE", "\u{274c}")
        };

        let payload = serde_json::json!({
            "embeds": [{
                "title": format!("{emoji} {} is {status}", alert.target_name),
                "description": format!(
                    "**URL:** {}\n**Response Time:** {}ms",
                    alert.target_url, alert.response_time_ms
                ),
                "color": color,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }]
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Cloneable handle the uptime loop uses to enqueue alerts without
/// blocking.
#[derive(Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<Alert>,
}

impl AlertSender {
    /// Enqueue an alert. A full queue drops the alert with a warning
    /// rather than stalling the caller.
    pub fn dispatch(&self, alert: Alert) {
        if let Err(e) = self.tx.try_send(alert) {
            tracing::warn!("alert queue full, dropping notification: {e}");
        }
    }
}

/// Bounded queue plus the single worker task that delivers from it.
pub struct AlertDispatcher {
    tx: mpsc::Sender<Alert>,
    worker: tokio::task::JoinHandle<()>,
}

impl AlertDispatcher {
    pub fn start(notifier: Arc<dyn Notifier>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Alert>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                if let Err(e) = notifier.notify(&alert).await {
                    tracing::warn!(
                        target_name = %alert.target_name,
                        "alert delivery failed: {e:#}"
                    );
                }
            }
        });

        Self { tx, worker }
    }

    pub fn sender(&self) -> AlertSender {
        AlertSender { tx: self.tx.clone() }
    }

    /// Close the queue and wait for in-flight deliveries to finish.
    pub async fn shutdown(self) {
        let Self { tx, worker } = self;
        drop(tx);
        if let Err(e) = worker.await {
            tracing::warn!("alert worker ended abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingNotifier {
        delivered: Mutex<Vec<Alert>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, alert: &Alert) -> Result<()> {
            self.delivered.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _alert: &Alert) -> Result<()> {
            anyhow::bail!("endpoint unreachable")
        }
    }

    fn alert(name: &str, is_up: bool) -> Alert {
        Alert {
            target_name: name.to_string(),
            target_url: format!("https://{name}.example"),
            is_up,
            response_time_ms: 12,
        }
    }

    #[tokio::test]
    async fn shutdown_drains_queued_alerts() {
        let notifier = Arc::new(RecordingNotifier { delivered: Mutex::new(Vec::new()) });
        let dispatcher = AlertDispatcher::start(notifier.clone(), 8);
        let sender = dispatcher.sender();

        sender.dispatch(alert("a", false));
        sender.dispatch(alert("b", true));
        drop(sender);
        dispatcher.shutdown().await;

        let delivered = notifier.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].target_name, "a");
        assert!(!delivered[0].is_up);
    }

    #[tokio::test]
    async fn failing_notifier_does_not_kill_the_worker() {
        let dispatcher = AlertDispatcher::start(Arc::new(FailingNotifier), 8);
        let sender = dispatcher.sender();

        sender.dispatch(alert("a", false));
        sender.dispatch(alert("b", false));
        drop(sender);

        // Both deliveries fail; shutdown still completes cleanly.
        dispatcher.shutdown().await;
    }
}
