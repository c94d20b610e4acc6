use anyhow::Result;
use std::time::{Duration, Instant};

use super::types::Observation;
use crate::store::models::Target;

/// Identifying header sent with every probe request.
const USER_AGENT: &str = "vigil-monitor/1.0";

/// Probe trait - one uptime check against one target.
///
/// A probe never fails: network failure is itself an outcome and is returned
/// as a down observation with status code 0.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &Target) -> Observation;
}

/// HTTP(S) prober backed by a shared client with a bounded total timeout.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Probe for HttpProber {
    async fn probe(&self, target: &Target) -> Observation {
        let observation = Observation::new(target.uuid);
        let start = Instant::now();

        match self.client.get(&target.url).send().await {
            Ok(response) => {
                // Latency is measured to response headers, not body end.
                let elapsed = start.elapsed().as_millis() as i64;
                let status_code = response.status().as_u16();
                let observation = observation.completed(status_code, elapsed);

                tracing::debug!(
                    target_name = %target.name,
                    status_code,
                    response_time_ms = elapsed,
                    is_up = observation.is_up,
                    "probe completed"
                );
                observation
            }
            Err(e) => {
                let elapsed = start.elapsed().as_millis() as i64;
                tracing::debug!(
                    target_name = %target.name,
                    response_time_ms = elapsed,
                    error = %e,
                    "probe failed at transport level"
                );
                observation.transport_failure(elapsed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response on an ephemeral port, then hang up.
    async fn one_shot_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response =
                    format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{addr}/")
    }

    fn test_target(url: String) -> Target {
        Target::new("probe-test".to_string(), url)
    }

    #[tokio::test]
    async fn ok_response_is_up() {
        let url = one_shot_server("200 OK").await;
        let prober = HttpProber::new(5).unwrap();

        let obs = prober.probe(&test_target(url)).await;
        assert!(obs.is_up);
        assert_eq!(obs.status_code, 200);
        assert!(obs.response_time_ms >= 0);
    }

    #[tokio::test]
    async fn server_error_is_down_with_code() {
        let url = one_shot_server("503 Service Unavailable").await;
        let prober = HttpProber::new(5).unwrap();

        let obs = prober.probe(&test_target(url)).await;
        assert!(!obs.is_up);
        assert_eq!(obs.status_code, 503);
    }

    #[tokio::test]
    async fn rate_limited_is_still_up() {
        let url = one_shot_server("429 Too Many Requests").await;
        let prober = HttpProber::new(5).unwrap();

        let obs = prober.probe(&test_target(url)).await;
        assert!(obs.is_up);
        assert_eq!(obs.status_code, 429);
    }

    #[tokio::test]
    async fn refused_connection_is_down_with_zero_code() {
        // Bind to learn a free port, then drop the listener so the probe
        // finds nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::new(5).unwrap();
        let obs = prober.probe(&test_target(format!("http://{addr}/"))).await;

        assert!(!obs.is_up);
        assert_eq!(obs.status_code, 0);
    }
}
