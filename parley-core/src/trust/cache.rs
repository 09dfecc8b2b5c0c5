// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! CRL cache
//!
//! Maps distribution point URL to the last fetched CRL. An entry is reused
//! until the CRL's own `nextUpdate` passes, then fetched again once.
//!
//! Locking is per URL: the map lock is only held to find or create a slot,
//! and a refresh holds just that slot's lock, so lookups of other URLs
//! proceed while one URL is being fetched.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use super::crl::Crl;
use super::error::TrustError;
use super::fetcher::CrlFetcher;
use crate::clock::{Clock, SystemClock};

type Slot = Arc<Mutex<Option<Arc<Crl>>>>;

/// Shared CRL cache keyed by URL.
pub struct CrlCache {
    fetcher: Arc<dyn CrlFetcher>,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Slot>>,
}

impl CrlCache {
    /// Creates an empty cache using the system clock.
    pub fn new(fetcher: Arc<dyn CrlFetcher>) -> Self {
        Self::with_clock(fetcher, Arc::new(SystemClock))
    }

    /// Creates an empty cache reading time from `clock`.
    pub fn with_clock(fetcher: Arc<dyn CrlFetcher>, clock: Arc<dyn Clock>) -> Self {
        CrlCache {
            fetcher,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the CRL for `url`, fetching it if missing or expired.
    ///
    /// Fetch and parse errors propagate; a stale entry is never served in
    /// place of a failed refresh.
    pub async fn get(&self, url: &str) -> Result<Arc<Crl>, TrustError> {
        let slot = self.slot(url);
        let mut entry = slot.lock().await;

        if let Some(crl) = entry.as_ref() {
            if !crl.is_expired(self.clock.now()) {
                debug!(%url, "CRL cache hit");
                return Ok(Arc::clone(crl));
            }
            debug!(%url, "cached CRL expired, refreshing");
        }

        *entry = None;
        let der = self.fetcher.fetch(url).await?;
        let crl = Arc::new(Crl::from_der(url, der)?);
        debug!(%url, revoked = crl.revoked_count(), "CRL fetched");
        *entry = Some(Arc::clone(&crl));
        Ok(crl)
    }

    /// Number of URLs with a cached CRL slot.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every cached CRL.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn slot(&self, url: &str) -> Slot {
        if let Some(slot) = self.entries.read().get(url) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(url.to_string()).or_default())
    }
}
