//! JSON inbox listing source.
//!
//! An upstream mail/alert poller drops listings into a JSON array file.
//! Each fetch reads listings from the front of the array. They are removed
//! only when acknowledged, and the file is rewritten through a temp file
//! and rename.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::ListingSource;
use crate::types::{DealScoutError, RawListing};

pub struct InboxSource {
    path: PathBuf,
    lock: Mutex<()>,
}

impl InboxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(path: &Path) -> Result<Vec<RawListing>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read inbox {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse inbox {}", path.display()))
    }

    async fn write_all(path: &Path, listings: &[RawListing]) -> Result<()> {
        let json = serde_json::to_string_pretty(listings).context("Failed to serialise inbox")?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write inbox {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move inbox into {}", path.display()))
    }

    async fn peek(&self, max: usize) -> Result<Vec<RawListing>> {
        let _guard = self.lock.lock().await;
        let mut pending = Self::read_all(&self.path).await?;
        let total = pending.len();
        pending.truncate(max);
        debug!(fetched = pending.len(), pending = total, "Inbox read");
        Ok(pending)
    }

    /// Drop every entry whose URL was acknowledged. Entries appended since
    /// the last read are kept.
    async fn remove(&self, listing_urls: &[String]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let pending = Self::read_all(&self.path).await?;
        let acked: HashSet<&str> = listing_urls.iter().map(String::as_str).collect();

        let before = pending.len();
        let rest: Vec<RawListing> = pending
            .into_iter()
            .filter(|l| !acked.contains(l.listing_url.as_str()))
            .collect();
        let removed = before - rest.len();
        if removed > 0 {
            Self::write_all(&self.path, &rest).await?;
        }

        debug!(removed, remaining = rest.len(), "Inbox acknowledged");
        Ok(removed)
    }
}

#[async_trait]
impl ListingSource for InboxSource {
    async fn fetch_batch(&self, max: usize) -> Result<Vec<RawListing>, DealScoutError> {
        self.peek(max).await.map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Inbox read failed");
            DealScoutError::transient("inbox", format!("{e:#}"))
        })
    }

    async fn acknowledge(&self, listing_urls: &[String]) -> Result<(), DealScoutError> {
        self.remove(listing_urls).await.map(|_| ()).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Inbox acknowledgement failed");
            DealScoutError::transient("inbox", format!("{e:#}"))
        })
    }
}
