//! Liveness probing for candidate endpoints
//!
//! A probe proves an endpoint can carry a plain HTTP request end to end and measures how
//! long that took.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument};
use url::Url;

use super::feed::BROWSER_USER_AGENT;
use crate::error::{BookerError, Result};
use crate::models::ProxyEndpoint;

/// Checks whether an endpoint forwards requests
#[async_trait]
pub trait EndpointProber: Send + Sync {
    /// Probe `address` and return the measured round-trip time
    async fn probe(&self, address: &str) -> Result<Duration>;
}

/// Prober that sends absolute-form GET requests through the endpoint
pub struct HttpProber {
    echo_urls: Vec<Url>,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(echo_urls: Vec<Url>, timeout: Duration) -> Self {
        Self { echo_urls, timeout }
    }

    /// One request through the endpoint; succeeds on a 2xx status line
    async fn probe_once(address: &str, echo_url: &Url) -> std::result::Result<(), anyhow::Error> {
        let host = echo_url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("echo url has no host"))?;
        let host_header = match echo_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut stream = TcpStream::connect(address).await?;

        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
            echo_url, host_header, BROWSER_USER_AGENT
        );
        stream.write_all(request.as_bytes()).await?;

        let mut response = vec![0u8; 1024];
        let n = stream.read(&mut response).await?;
        if n == 0 {
            anyhow::bail!("empty response");
        }

        match parse_status_line(&response[..n]) {
            Some(status) if (200..300).contains(&status) => Ok(()),
            Some(status) => anyhow::bail!("HTTP {}", status),
            None => anyhow::bail!("invalid HTTP response"),
        }
    }

    async fn try_echo_urls(&self, address: &str) -> Result<()> {
        let mut last_error = None;
        for echo_url in &self.echo_urls {
            match Self::probe_once(address, echo_url).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("Probe of {} via {} failed: {}", address, echo_url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(BookerError::ProbeFailed(match last_error {
            Some(e) => format!("all echo endpoints failed, last: {}", e),
            None => "no echo endpoints configured".to_string(),
        }))
    }
}

#[async_trait]
impl EndpointProber for HttpProber {
    #[instrument(skip(self))]
    async fn probe(&self, address: &str) -> Result<Duration> {
        let started = Instant::now();

        match timeout(self.timeout, self.try_echo_urls(address)).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BookerError::Timeout),
        }
    }
}

/// Status code from the first line of a raw HTTP response
pub fn parse_status_line(raw: &[u8]) -> Option<u16> {
    let text = String::from_utf8_lossy(raw);
    let line = text.lines().next()?;
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Probe every candidate with at most `concurrency_limit` probes in flight
///
/// Returns only the candidates that answered, tagged with their latency. One candidate's
/// failure never affects another's result.
pub async fn validate_batch(
    prober: &dyn EndpointProber,
    candidates: Vec<String>,
    concurrency_limit: usize,
) -> Vec<ProxyEndpoint> {
    let total = candidates.len();
    info!(
        "Validating {} candidate endpoints with {} workers",
        total,
        concurrency_limit.max(1)
    );

    let verified: Vec<ProxyEndpoint> = futures::stream::iter(candidates)
        .map(|address| async move {
            match prober.probe(&address).await {
                Ok(latency) => {
                    debug!(
                        "Endpoint {} verified in {:.3}s",
                        address,
                        latency.as_secs_f64()
                    );
                    Some(ProxyEndpoint::verified(address, latency.as_secs_f64()))
                }
                Err(e) => {
                    debug!("Endpoint {} rejected: {}", address, e);
                    None
                }
            }
        })
        .buffer_unordered(concurrency_limit.max(1))
        .filter_map(|result| async move { result })
        .collect()
        .await;

    info!(
        "Validation complete: {} of {} endpoints verified",
        verified.len(),
        total
    );
    verified
}
