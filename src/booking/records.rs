//! Candidate input and booking output collaborators

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{BookerError, Result};
use crate::models::CandidateRecord;

/// Loads the candidate record a run books for
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn load(&self, path: &Path) -> Result<CandidateRecord>;
}

/// Candidate data from a JSON file
///
/// The file holds either one record object or an array whose first element is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCandidateSource;

#[async_trait]
impl CandidateSource for JsonCandidateSource {
    async fn load(&self, path: &Path) -> Result<CandidateRecord> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            BookerError::CandidateData(format!("cannot read {}: {}", path.display(), e))
        })?;

        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            BookerError::CandidateData(format!("{} is not valid JSON: {}", path.display(), e))
        })?;

        let record_value = match value {
            Value::Array(mut rows) => {
                if rows.is_empty() {
                    return Err(BookerError::CandidateData(format!(
                        "{} contains no records",
                        path.display()
                    )));
                }
                if rows.len() > 1 {
                    debug!("{} holds {} records, using the first", path.display(), rows.len());
                }
                rows.swap_remove(0)
            }
            other => other,
        };

        let record: CandidateRecord = serde_json::from_value(record_value)
            .map_err(|e| BookerError::CandidateData(e.to_string()))?;
        record.validate().map_err(BookerError::CandidateData)?;

        info!("Loaded candidate {}", record.summary());
        Ok(record)
    }
}

/// One completed booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub timestamp: DateTime<Utc>,
    pub candidate_name: String,
    pub email: String,
    pub passport_number: String,
    pub payment_url: String,
    pub country: String,
    pub city: String,
    pub country_traveling_to: String,
}

impl BookingRecord {
    pub fn new(candidate: &CandidateRecord, payment_url: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            candidate_name: candidate.full_name(),
            email: candidate.email_address.clone(),
            passport_number: candidate.passport_number.clone(),
            payment_url: payment_url.into(),
            country: candidate.country.clone(),
            city: candidate.city.clone(),
            country_traveling_to: candidate.country_traveling_to.clone(),
        }
    }
}

/// Append-only store of completed bookings
#[async_trait]
pub trait SuccessSink: Send + Sync {
    async fn record_success(&self, record: &BookingRecord) -> Result<()>;
}

/// Writes one JSON object per line, never rewriting earlier lines
#[derive(Debug, Clone)]
pub struct JsonlSuccessSink {
    path: PathBuf,
}

impl JsonlSuccessSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SuccessSink for JsonlSuccessSink {
    async fn record_success(&self, record: &BookingRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!("Payment URL saved to {}", self.path.display());
        Ok(())
    }
}
