//! Proxy feed sources and candidate parsing
//!
//! Feeds hand back raw lines; turning them into syntactically valid, de-duplicated
//! `IPv4:port` candidates happens here, on the pool side.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{BookerError, Result};

pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Source of raw candidate endpoints
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the raw body of a feed, one entry per line
    async fn fetch(&self, feed_url: &str) -> Result<Vec<String>>;
}

/// Feed source backed by plain HTTP(S) downloads
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    #[instrument(skip(self))]
    async fn fetch(&self, feed_url: &str) -> Result<Vec<String>> {
        let response = self.client.get(feed_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BookerError::FeedUnavailable {
                url: feed_url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let body = response.text().await?;
        let lines: Vec<String> = body.lines().map(str::to_string).collect();
        debug!("Feed {} returned {} lines", feed_url, lines.len());
        Ok(lines)
    }
}

/// Turn raw feed output into unique, syntactically valid candidates in first-seen order
pub fn parse_feed(lines: &[String]) -> Vec<String> {
    let body = lines.join("\n");
    let trimmed = body.trim();

    let raw: Vec<String> = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => entries_from_json(&value),
            Err(_) => lines.to_vec(),
        }
    } else {
        lines.to_vec()
    };

    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|entry| normalize_endpoint(entry))
        .filter(|endpoint| seen.insert(endpoint.clone()))
        .collect()
}

/// Structured feeds: `{ "data": [ {ip, port} ] }`, `[ {ip|host, port} ]` or `[ "ip:port" ]`
fn entries_from_json(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        Value::Array(items) => items.as_slice(),
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => {
                let host = map
                    .get("ip")
                    .or_else(|| map.get("host"))
                    .and_then(Value::as_str)?;
                let port = match map.get("port")? {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some(format!("{}:{}", host, port))
            }
            _ => None,
        })
        .collect()
}

/// Validate an `IPv4:port` entry, returning it trimmed
pub fn normalize_endpoint(raw: &str) -> Option<String> {
    let entry = raw.trim();
    let (ip, port) = entry.split_once(':')?;

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return None;
    }
    for octet in octets {
        if octet.is_empty() || octet.len() > 3 || !octet.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if octet.parse::<u16>().ok()? > 255 {
            return None;
        }
    }

    if port.is_empty() || port.len() > 5 || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let port: u32 = port.parse().ok()?;
    if !(1..=65535).contains(&port) {
        return None;
    }

    Some(entry.to_string())
}
