// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Test Doubles
//!
//! In-memory CRL fetcher and token provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};

use parley_core::{CrlFetcher, TokenError, TokenEvent, TokenProvider, TrustError};

/// Serves CRLs from memory and counts fetches per URL.
#[derive(Default)]
pub struct MemoryCrlFetcher {
    crls: Mutex<HashMap<String, Vec<u8>>>,
    fetches: Mutex<HashMap<String, usize>>,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
}

impl MemoryCrlFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves `der` for `url` from now on.
    pub fn serve(&self, url: &str, der: Vec<u8>) {
        self.crls.lock().insert(url.to_string(), der);
    }

    /// Makes `url` fail to fetch.
    pub fn remove(&self, url: &str) {
        self.crls.lock().remove(url);
    }

    /// Makes fetches of `url` hang until [`MemoryCrlFetcher::release`].
    pub fn hold(&self, url: &str) {
        self.holds
            .lock()
            .insert(url.to_string(), Arc::new(Notify::new()));
    }

    /// Lets a held fetch of `url` finish.
    pub fn release(&self, url: &str) {
        if let Some(gate) = self.holds.lock().remove(url) {
            gate.notify_one();
        }
    }

    /// Number of fetches of `url` so far.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CrlFetcher for MemoryCrlFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TrustError> {
        *self.fetches.lock().entry(url.to_string()).or_default() += 1;
        let gate = self.holds.lock().get(url).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.crls
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| TrustError::CrlFetch {
                url: url.to_string(),
                reason: "HTTP 404".into(),
            })
    }
}

/// Token provider driven by the test.
///
/// With auto refresh on, every invalidation immediately issues
/// `token-<n>` with an increasing `n`.
pub struct MockTokenProvider {
    events: broadcast::Sender<TokenEvent>,
    invalidations: AtomicUsize,
    issued: AtomicUsize,
    auto_refresh: AtomicBool,
}

impl MockTokenProvider {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(MockTokenProvider {
            events,
            invalidations: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
            auto_refresh: AtomicBool::new(false),
        })
    }

    pub fn auto_refreshing() -> Arc<Self> {
        let provider = Self::new();
        provider.auto_refresh.store(true, Ordering::SeqCst);
        provider
    }

    /// Emits `TokenEvent::New(token)`.
    pub fn issue(&self, token: &str) {
        let _ = self.events.send(TokenEvent::New(token.to_string()));
    }

    /// Emits the next `token-<n>` and returns it.
    pub fn issue_next(&self) -> String {
        let token = format!("token-{}", self.issued.fetch_add(1, Ordering::SeqCst));
        self.issue(&token);
        token
    }

    /// Emits `TokenEvent::Error`.
    pub fn fail(&self, reason: &str) {
        let _ = self.events.send(TokenEvent::Error(TokenError::new(reason)));
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl TokenProvider for MockTokenProvider {
    fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.events.subscribe()
    }

    fn invalidate_token(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        if self.auto_refresh.load(Ordering::SeqCst) {
            self.issue_next();
        }
    }
}
