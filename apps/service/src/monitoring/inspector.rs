use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;
use url::Url;
use uuid::Uuid;
use x509_parser::prelude::*;

use super::types::CertificateRecord;

/// Inspection failed before any network activity: the target URL cannot be
/// turned into a host to handshake with. Callers skip the target; handshake
/// failures are NOT errors and come back as records with `error` set.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("target URL has no usable host: {0}")]
    InvalidTarget(String),
}

/// Inspect trait - one TLS certificate inspection against one target.
#[async_trait::async_trait]
pub trait Inspect: Send + Sync {
    async fn inspect(&self, target_id: Uuid, url: &str)
    -> Result<CertificateRecord, InspectError>;
}

/// TLS certificate inspector backed by a client config with native roots.
pub struct CertificateInspector {
    connector: TlsConnector,
    timeout: Duration,
}

impl CertificateInspector {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        // Without a process-level crypto provider rustls refuses to build a
        // connection; the error is ignored since a provider may already be
        // installed.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            tracing::warn!("skipping unreadable native root certificate: {err}");
        }

        let mut roots = rustls::RootCertStore::empty();
        roots.add_parsable_certificates(native.certs);

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout: Duration::from_secs(timeout_seconds),
        })
    }

    /// Handshake and return the peer's DER certificate chain, leaf first.
    async fn peer_chain(&self, server_name: &str, addr: &str) -> Result<Vec<Vec<u8>>> {
        let dns_name = rustls::pki_types::ServerName::try_from(server_name.to_string())?;
        let tcp = TcpStream::connect(addr).await?;
        let tls = self.connector.connect(dns_name, tcp).await?;

        let (_, connection) = tls.get_ref();
        Ok(connection
            .peer_certificates()
            .map(|chain| chain.iter().map(|der| der.as_ref().to_vec()).collect())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Inspect for CertificateInspector {
    async fn inspect(
        &self,
        target_id: Uuid,
        url: &str,
    ) -> Result<CertificateRecord, InspectError> {
        let endpoint = Endpoint::parse(url)?;

        let chain = match timeout(self.timeout, self.peer_chain(&endpoint.server_name, &endpoint.addr)).await {
            Ok(Ok(chain)) => chain,
            Ok(Err(e)) => {
                return Ok(CertificateRecord::failure(
                    target_id,
                    endpoint.host,
                    format!("{e:#}"),
                ));
            }
            Err(_) => {
                return Ok(CertificateRecord::failure(
                    target_id,
                    endpoint.host,
                    "handshake timed out".to_string(),
                ));
            }
        };

        let Some(leaf) = chain.first() else {
            return Ok(CertificateRecord::failure(
                target_id,
                endpoint.host,
                "no peer certificates".to_string(),
            ));
        };

        match parse_leaf(leaf) {
            Ok((valid_from, valid_to, issuer)) => Ok(CertificateRecord::from_validity(
                target_id,
                endpoint.host,
                valid_from,
                valid_to,
                issuer,
            )),
            Err(e) => Ok(CertificateRecord::failure(
                target_id,
                endpoint.host,
                format!("{e:#}"),
            )),
        }
    }
}

/// Validity window and issuer of a DER-encoded leaf certificate. The issuer
/// common name is preferred, with the full DN as fallback when it is absent
/// or empty.
fn parse_leaf(der: &[u8]) -> Result<(i64, i64, String)> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| anyhow!("failed to parse leaf certificate: {e}"))?;

    let validity = cert.validity();
    let valid_from = validity.not_before.timestamp();
    let valid_to = validity.not_after.timestamp();

    let issuer = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .filter(|cn| !cn.is_empty())
        .unwrap_or_else(|| cert.issuer().to_string());

    Ok((valid_from, valid_to, issuer))
}

/// A target URL broken down for the handshake.
struct Endpoint {
    /// Hostname presented for server-name verification (no port)
    server_name: String,
    /// Host as recorded, keeping an explicit port if the URL carried one
    host: String,
    /// Dial address, port defaulted to 443
    addr: String,
}

impl Endpoint {
    fn parse(raw: &str) -> Result<Self, InspectError> {
        let url = Url::parse(raw).map_err(|_| InspectError::InvalidTarget(raw.to_string()))?;
        let server_name = url
            .host_str()
            .ok_or_else(|| InspectError::InvalidTarget(raw.to_string()))?
            .to_string();

        let (host, port) = match url.port() {
            Some(port) => (format!("{server_name}:{port}"), port),
            None => (server_name.clone(), 443),
        };

        Ok(Self {
            addr: format!("{server_name}:{port}"),
            server_name,
            host,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_defaults_to_port_443() {
        let ep = Endpoint::parse("https://example.com/health").unwrap();
        assert_eq!(ep.server_name, "example.com");
        assert_eq!(ep.host, "example.com");
        assert_eq!(ep.addr, "example.com:443");
    }

    #[test]
    fn endpoint_keeps_explicit_port() {
        let ep = Endpoint::parse("https://example.com:8443/").unwrap();
        assert_eq!(ep.host, "example.com:8443");
        assert_eq!(ep.addr, "example.com:8443");
    }

    #[test]
    fn hostless_url_is_invalid() {
        assert!(matches!(
            Endpoint::parse("mailto:ops@example.com"),
            Err(InspectError::InvalidTarget(_))
        ));
        assert!(matches!(
            Endpoint::parse("not a url"),
            Err(InspectError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn hostless_url_skips_inspection() {
        let inspector = CertificateInspector::new(2).unwrap();
        let result = inspector.inspect(Uuid::new_v4(), "mailto:ops@example.com").await;
        assert!(matches!(result, Err(InspectError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn refused_handshake_becomes_failure_record() {
        // Learn a free port, then close it again so the dial is refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let inspector = CertificateInspector::new(2).unwrap();
        let target_id = Uuid::new_v4();
        let record = inspector
            .inspect(target_id, &format!("https://{addr}/"))
            .await
            .unwrap();

        assert_eq!(record.target_id, target_id);
        assert!(record.error.is_some());
        assert!(record.valid_to.is_none());
        assert!(record.days_left.is_none());
    }
}
