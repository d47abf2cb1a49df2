//! On-disk persistence of the verified endpoint set

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{BookerError, Result};
use crate::models::{CacheFile, ProxyEndpoint};

/// JSON file holding the verified-working endpoints
#[derive(Debug, Clone)]
pub struct ProxyCache {
    path: PathBuf,
}

impl ProxyCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached set; a missing file is an empty set
    pub fn load(&self) -> Result<Vec<ProxyEndpoint>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No proxy cache at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let file: CacheFile = serde_json::from_str(&raw).map_err(|e| {
            BookerError::Cache(format!("{} is not a valid cache: {}", self.path.display(), e))
        })?;

        if file.total_count != file.proxies.len() {
            warn!(
                "Proxy cache {} claims {} entries but holds {}",
                self.path.display(),
                file.total_count,
                file.proxies.len()
            );
        }

        Ok(file.proxies)
    }

    /// Replace the cached set
    ///
    /// Written to a sibling temp file and renamed over the target, so readers never see a
    /// partial file.
    pub fn save(&self, endpoints: &[ProxyEndpoint]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = CacheFile::new(endpoints.to_vec());
        let body = serde_json::to_string_pretty(&file)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(
            "Saved {} endpoints to {}",
            endpoints.len(),
            self.path.display()
        );
        Ok(())
    }
}
