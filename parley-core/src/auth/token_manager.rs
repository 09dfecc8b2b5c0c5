// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Auth Token Manager
//!
//! Runs authenticated work once a token is available. Work bound while no
//! token is held waits in a FIFO queue; a `TokenEvent::New` releases the
//! whole queue with the same token, a `TokenEvent::Error` fails it.
//!
//! Released work starts in queue order whatever runtime it is bound on:
//! each released caller gets a turn that opens only once the caller ahead
//! of it has started its work (called it and polled it once).
//!
//! Work rejected as unauthorized invalidates the token it used and waits for
//! the next one, up to `max_retries` times. Other failures return at once and
//! leave the token alone.

use std::collections::VecDeque;
use std::future::{poll_fn, Future};
use std::pin::pin;
use std::sync::{Arc, Weak};
use std::task::Poll;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use super::credentials::{TokenError, TokenEvent, TokenProvider, UserCredentials};
use crate::config::RelayClientConfig;

/// Default number of retries after an authorization failure.
pub const MAX_AUTH_RETRIES: u32 = 3;

/// Classifies work errors caused by a stale or rejected token.
pub trait AuthFailure {
    fn is_unauthorized(&self) -> bool;
}

/// Why bound work did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError<E> {
    /// No token could be obtained.
    #[error("{0}")]
    Token(TokenError),

    /// The work itself failed (after any retries).
    #[error("{0}")]
    Work(E),
}

/// Start order for one released caller.
struct Turn {
    /// Resolves once the previous caller in the queue has started.
    after: Option<oneshot::Receiver<()>>,
    /// Signalled once this caller has started.
    started: oneshot::Sender<()>,
}

/// A token handed to a caller, with its turn if it was queued.
struct Grant {
    token: String,
    turn: Option<Turn>,
}

type Waiter = oneshot::Sender<Result<Grant, TokenError>>;

#[derive(Default)]
struct TokenState {
    token: Option<String>,
    waiters: VecDeque<Waiter>,
}

struct Inner {
    address: String,
    provider: Arc<dyn TokenProvider>,
    max_retries: u32,
    state: Mutex<TokenState>,
}

/// Gates authenticated work behind token availability.
///
/// Cheap to clone; clones share the same token and queue.
#[derive(Clone)]
pub struct AuthTokenManager {
    inner: Arc<Inner>,
}

impl AuthTokenManager {
    /// Creates a manager for `address` and starts listening to `provider`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(address: impl Into<String>, provider: Arc<dyn TokenProvider>) -> Self {
        Self::start_with_max_retries(address, provider, MAX_AUTH_RETRIES)
    }

    /// Like [`AuthTokenManager::start`] with a custom retry bound.
    pub fn start_with_max_retries(
        address: impl Into<String>,
        provider: Arc<dyn TokenProvider>,
        max_retries: u32,
    ) -> Self {
        let events = provider.subscribe();
        let manager = AuthTokenManager {
            inner: Arc::new(Inner {
                address: address.into(),
                provider,
                max_retries,
                state: Mutex::new(TokenState::default()),
            }),
        };
        tokio::spawn(pump_token_events(Arc::downgrade(&manager.inner), events));
        manager
    }

    /// Like [`AuthTokenManager::start`], taking the retry bound from `config`.
    pub fn from_config(
        address: impl Into<String>,
        provider: Arc<dyn TokenProvider>,
        config: &RelayClientConfig,
    ) -> Self {
        Self::start_with_max_retries(address, provider, config.max_auth_retries)
    }

    /// Address used for every credential this manager hands out.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Retry bound for unauthorized work.
    pub fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }

    /// Returns true if a token is currently held.
    pub fn has_token(&self) -> bool {
        self.inner.state.lock().token.is_some()
    }

    /// Number of bind calls waiting for a token.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Applies one provider event.
    ///
    /// Called by the listener task; exposed for hosts that dispatch token
    /// events themselves.
    pub fn handle_token_event(&self, event: TokenEvent) {
        self.inner.handle_token_event(event);
    }

    /// Runs `work` with current credentials, waiting for a token if needed.
    ///
    /// `work` is called again with fresh credentials each time it fails with
    /// an unauthorized error, at most `max_retries` times.
    pub async fn bind<T, E, F, Fut>(&self, mut work: F) -> Result<T, BindError<E>>
    where
        F: FnMut(UserCredentials) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: AuthFailure,
    {
        let mut retries = 0;
        loop {
            let grant = self.acquire_token().await.map_err(BindError::Token)?;
            let token = grant.token;
            let credentials = UserCredentials::new(self.inner.address.clone(), token.clone());

            match run_in_turn(grant.turn, || work(credentials)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_unauthorized() && retries < self.inner.max_retries => {
                    retries += 1;
                    debug!(
                        retry = retries,
                        max = self.inner.max_retries,
                        "unauthorized, refreshing token"
                    );
                    self.inner.invalidate(&token);
                }
                Err(e) => {
                    if e.is_unauthorized() {
                        warn!(retries, "unauthorized after exhausting retries");
                    }
                    return Err(BindError::Work(e));
                }
            }
        }
    }

    async fn acquire_token(&self) -> Result<Grant, TokenError> {
        let waiter = {
            let mut state = self.inner.state.lock();
            if let Some(token) = &state.token {
                return Ok(Grant {
                    token: token.clone(),
                    turn: None,
                });
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        debug!("waiting for auth token");
        waiter
            .await
            .unwrap_or_else(|_| Err(TokenError::new("token manager dropped")))
    }
}

impl Inner {
    fn handle_token_event(&self, event: TokenEvent) {
        match event {
            TokenEvent::New(token) => {
                let waiters = {
                    let mut state = self.state.lock();
                    state.token = Some(token.clone());
                    std::mem::take(&mut state.waiters)
                };
                info!(address = %self.address, released = waiters.len(), "auth token available");
                let mut previous: Option<oneshot::Receiver<()>> = None;
                for waiter in waiters {
                    let (started, next) = oneshot::channel();
                    let grant = Grant {
                        token: token.clone(),
                        turn: Some(Turn {
                            after: previous.take(),
                            started,
                        }),
                    };
                    match waiter.send(Ok(grant)) {
                        Ok(()) => previous = Some(next),
                        // caller gone: the next one waits on whoever was ahead of it
                        Err(unsent) => {
                            previous = unsent.ok().and_then(|g| g.turn).and_then(|t| t.after);
                        }
                    }
                }
            }
            TokenEvent::Error(e) => self.fail_all(e),
        }
    }

    fn fail_all(&self, error: TokenError) {
        let waiters = {
            let mut state = self.state.lock();
            state.token = None;
            std::mem::take(&mut state.waiters)
        };
        warn!(address = %self.address, error = %error, failed = waiters.len(), "auth token error");
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    /// Drops `used` and asks the provider for a new token.
    ///
    /// Skipped if the token was already replaced since `used` was handed out.
    fn invalidate(&self, used: &str) {
        {
            let mut state = self.state.lock();
            if state.token.as_deref() != Some(used) {
                return;
            }
            state.token = None;
        }
        self.provider.invalidate_token();
    }
}

/// Starts `work` once `turn` opens, then opens the next caller's turn.
///
/// The work future is polled once before the next turn opens, so whatever
/// it does up to its first suspension happens in queue order.
async fn run_in_turn<F, Fut>(turn: Option<Turn>, work: F) -> Fut::Output
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    let Some(turn) = turn else {
        return work().await;
    };
    if let Some(after) = turn.after {
        // an error means the caller ahead was dropped; go anyway
        let _ = after.await;
    }

    let mut running = pin!(work());
    let first = poll_fn(|cx| Poll::Ready(running.as_mut().poll(cx))).await;
    let _ = turn.started.send(());
    match first {
        Poll::Ready(output) => output,
        Poll::Pending => running.await,
    }
}

async fn pump_token_events(inner: Weak<Inner>, mut events: broadcast::Receiver<TokenEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "token events lagged");
                continue;
            }
            Err(RecvError::Closed) => {
                if let Some(inner) = inner.upgrade() {
                    inner.fail_all(TokenError::new("token provider closed"));
                }
                return;
            }
        };
        match inner.upgrade() {
            Some(inner) => inner.handle_token_event(event),
            None => return,
        }
    }
}
