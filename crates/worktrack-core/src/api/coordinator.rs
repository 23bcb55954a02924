//! Single-flight renewal of the access credential.
//!
//! Any number of requests can see a 401 at roughly the same time. The first
//! caller into [`RefreshCoordinator::renew`] becomes the leader and performs
//! the one renewal call; everyone arriving while it is outstanding queues a
//! one-shot resolver and receives the leader's outcome. The leader commits
//! the outcome to the [`CredentialStore`] before any waiter is resolved, and
//! waiters are resolved in the order they queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::transport::{HttpRequest, HttpTransport};
use super::RenewalError;
use crate::auth::{claims, CredentialStore};

/// Outcome shared with every waiter: the renewed access credential, or
/// `None` when the session could not be renewed.
pub type RenewalOutcome = Option<String>;

#[derive(Debug, Deserialize)]
struct RenewalResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RenewalOutcome>>,
}

enum Role {
    Leader,
    Follower(oneshot::Receiver<RenewalOutcome>),
    Settled(RenewalOutcome),
}

pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    refresh_path: String,
    timeout: Duration,
    state: Mutex<RefreshState>,
    renewal_calls: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        transport: Arc<dyn HttpTransport>,
        refresh_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            refresh_path: refresh_path.into(),
            timeout,
            state: Mutex::new(RefreshState::default()),
            renewal_calls: AtomicU64::new(0),
        }
    }

    /// Obtain a renewed access credential.
    ///
    /// `stale` is the access credential the caller was using when it decided
    /// renewal was needed. If the store already holds a different access
    /// credential and no renewal is running, that one is returned without a
    /// network call: the caller simply lost the race to an earlier window.
    /// An already expired stored credential starts a new window instead.
    pub async fn renew(&self, stale: Option<&str>) -> RenewalOutcome {
        let role = {
            let mut state = self.lock_state();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Role::Follower(rx)
            } else {
                match self.store.access() {
                    Some(current)
                        if stale.is_some_and(|s| s != current)
                            && !claims::is_expired(&current, 0) =>
                    {
                        Role::Settled(Some(current))
                    }
                    _ => {
                        state.refreshing = true;
                        Role::Leader
                    }
                }
            }
        };

        match role {
            Role::Settled(outcome) => {
                debug!("Access credential already renewed by an earlier window");
                outcome
            }
            Role::Follower(rx) => {
                debug!("Waiting on in-flight credential renewal");
                // A dropped sender means the leader vanished; treat as failure.
                rx.await.unwrap_or(None)
            }
            Role::Leader => self.lead().await,
        }
    }

    /// Number of renewal network calls made so far
    pub fn renewal_calls(&self) -> u64 {
        self.renewal_calls.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock_state().refreshing
    }

    /// Callers currently queued behind the leader
    pub fn waiting(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Drop any in-flight state, resolving queued waiters with `None`.
    pub fn reset(&self) {
        self.drain(None);
        self.renewal_calls.store(0, Ordering::SeqCst);
    }

    async fn lead(&self) -> RenewalOutcome {
        let refresh = self.store.refresh();
        let mut guard = LeaderGuard {
            coordinator: self,
            refresh: refresh.clone(),
            settled: false,
        };

        let outcome = match refresh {
            Some(refresh) => {
                let result = self.exchange(&refresh).await;
                self.commit(&refresh, result)
            }
            None => {
                warn!(error = %RenewalError::MissingRefresh, "Credential renewal failed");
                self.store.clear();
                None
            }
        };

        guard.settled = true;
        self.drain(outcome.clone());
        outcome
    }

    /// Exchange the refresh credential for a new access credential.
    async fn exchange(&self, refresh: &str) -> Result<String, RenewalError> {
        let Some(refresh_claims) = claims::decode(refresh) else {
            return Err(RenewalError::MalformedCredential);
        };
        if refresh_claims.is_expired_at(chrono::Utc::now().timestamp(), 0) {
            return Err(RenewalError::RefreshExpired);
        }

        self.renewal_calls.fetch_add(1, Ordering::SeqCst);
        debug!(path = %self.refresh_path, "Renewing access credential");

        let request = HttpRequest::post(&self.refresh_path, json!({ "refreshToken": refresh }));
        let response = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| RenewalError::Timeout(self.timeout))??;

        if !response.is_success() {
            return Err(RenewalError::Rejected(response.status));
        }

        let renewed: RenewalResponse = response
            .json()
            .map_err(|e| RenewalError::InvalidResponse(e.to_string()))?;
        if claims::decode(&renewed.access_token).is_none() {
            return Err(RenewalError::MalformedCredential);
        }
        Ok(renewed.access_token)
    }

    /// Write the result to the store. Must finish before any waiter is resolved.
    fn commit(&self, refresh: &str, result: Result<String, RenewalError>) -> RenewalOutcome {
        match result {
            Ok(access) => {
                if self.store.replace_access_if(refresh, &access) {
                    info!("Access credential renewed");
                    Some(access)
                } else {
                    debug!("Session changed during renewal, discarding renewed credential");
                    self.store.access()
                }
            }
            Err(e) => {
                warn!(error = %e, "Credential renewal failed, ending session");
                self.store.clear_if(refresh);
                None
            }
        }
    }

    /// Reset the flag and resolve every waiter, oldest first.
    fn drain(&self, outcome: RenewalOutcome) {
        let waiters = {
            let mut state = self.lock_state();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };

        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "Resolving queued renewal waiters");
        }
        for waiter in waiters {
            // Receiver gone means that caller was cancelled; nothing to do.
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ends the session and releases followers if the leader's future is
/// dropped before it settles.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    refresh: Option<String>,
    settled: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("Credential renewal abandoned before completion");
        if let Some(ref refresh) = self.refresh {
            self.coordinator.store.clear_if(refresh);
        }
        self.coordinator.drain(None);
    }
}
