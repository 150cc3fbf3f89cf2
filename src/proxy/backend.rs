// src/proxy/backend.rs
use chrono::{DateTime, Utc};
use url::Url;

/// One upstream target. Owned by the pool; all per-backend counters live
/// in the pool's maps, keyed by the normalized URL string. The health
/// flag is advisory metadata written by the health monitor. Selection
/// does not filter on it; eviction is the enforcement mechanism.
#[derive(Debug, Clone)]
pub struct Backend {
    pub url: Url,
    pub healthy: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Backend {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            healthy: true,
            last_checked: None,
        }
    }

    /// Canonical key for the pool's counter maps and the
    /// `x-forwarded-server` response header.
    pub fn address(&self) -> &str {
        self.url.as_str()
    }
}
