//! Scripted in-process backend for driving `ApiClient` end to end.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use worktrack_core::api::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use worktrack_core::{ApiClient, Config, CredentialPair, CredentialStore};

pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const LOGOUT_PATH: &str = "/api/auth/logout";

static SERIAL: AtomicU64 = AtomicU64::new(0);

/// Mint an unsigned credential expiring `expires_in` seconds from now.
/// Every call yields a distinct string.
pub fn credential(kind: &str, expires_in: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let payload = json!({
        "subjectId": "student-7",
        "email": "ada@example.com",
        "displayName": "Ada",
        "issuedAt": now,
        "expiresAt": now + expires_in,
        "kind": kind,
        "jti": SERIAL.fetch_add(1, Ordering::SeqCst),
    });
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewalBehavior {
    Succeed,
    Reject,
    Hang,
    NetworkError,
}

/// Fake backend.
///
/// Protected endpoints accept only the currently valid access credential;
/// the renewal endpoint mints a new one after an optional delay.
pub struct FakeBackend {
    valid_access: Mutex<Option<String>>,
    renewal: Mutex<RenewalBehavior>,
    renewal_delay: Duration,
    pub renewal_calls: AtomicUsize,
    pub protected_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// (path, bearer) of every protected call, in arrival order
    pub log: Mutex<Vec<(String, Option<String>)>>,
    /// Fixed status for a protected path, bypassing auth
    pub fixed_status: Mutex<Option<(String, u16)>>,
    pub fail_logout: Mutex<bool>,
}

impl FakeBackend {
    pub fn new(renewal_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new(None),
            renewal: Mutex::new(RenewalBehavior::Succeed),
            renewal_delay,
            renewal_calls: AtomicUsize::new(0),
            protected_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            fixed_status: Mutex::new(None),
            fail_logout: Mutex::new(false),
        })
    }

    pub fn set_renewal(&self, behavior: RenewalBehavior) {
        *self.renewal.lock().unwrap() = behavior;
    }

    pub fn set_valid_access(&self, access: Option<String>) {
        *self.valid_access.lock().unwrap() = access;
    }

    pub fn valid_access(&self) -> Option<String> {
        self.valid_access.lock().unwrap().clone()
    }

    pub fn renewals(&self) -> usize {
        self.renewal_calls.load(Ordering::SeqCst)
    }

    pub fn protected(&self) -> usize {
        self.protected_calls.load(Ordering::SeqCst)
    }

    fn protected_endpoint(&self, request: &HttpRequest) -> HttpResponse {
        self.protected_calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push((request.path.clone(), request.bearer.clone()));

        if let Some((path, status)) = self.fixed_status.lock().unwrap().clone() {
            if path == request.path {
                return HttpResponse::new(status, json!({ "error": "fixed" }).to_string());
            }
        }

        let valid = self.valid_access();
        if request.bearer.is_some() && request.bearer == valid {
            HttpResponse::new(200, json!({ "path": request.path, "ok": true }).to_string())
        } else {
            HttpResponse::new(401, json!({ "error": "expired" }).to_string())
        }
    }

    async fn renewal_endpoint(&self, body: Option<Value>) -> Result<HttpResponse, TransportError> {
        self.renewal_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.renewal.lock().unwrap();

        if behavior == RenewalBehavior::Hang {
            std::future::pending::<()>().await;
        }
        if !self.renewal_delay.is_zero() {
            tokio::time::sleep(self.renewal_delay).await;
        }

        match behavior {
            RenewalBehavior::Succeed => {
                let has_refresh = body
                    .as_ref()
                    .and_then(|b| b.get("refreshToken"))
                    .and_then(Value::as_str)
                    .is_some();
                if !has_refresh {
                    return Ok(HttpResponse::new(400, "missing refreshToken"));
                }
                let access = credential("access", 900);
                self.set_valid_access(Some(access.clone()));
                Ok(HttpResponse::new(
                    200,
                    json!({ "accessToken": access }).to_string(),
                ))
            }
            RenewalBehavior::Reject => Ok(HttpResponse::new(401, "refresh revoked")),
            RenewalBehavior::NetworkError => {
                Err(TransportError::Other("connection reset".to_string()))
            }
            RenewalBehavior::Hang => unreachable!(),
        }
    }

    fn login_endpoint(&self, body: Option<Value>) -> HttpResponse {
        let password = body
            .as_ref()
            .and_then(|b| b.get("password"))
            .and_then(Value::as_str);
        if password != Some("correct horse") {
            return HttpResponse::new(401, "bad credentials");
        }
        let access = credential("access", 900);
        let refresh = credential("refresh", 86_400);
        self.set_valid_access(Some(access.clone()));
        HttpResponse::new(
            200,
            json!({ "accessToken": access, "refreshToken": refresh }).to_string(),
        )
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        // Give concurrent callers a chance to interleave like a real network
        tokio::task::yield_now().await;
        match request.path.as_str() {
            REFRESH_PATH => self.renewal_endpoint(request.body).await,
            LOGIN_PATH => Ok(self.login_endpoint(request.body)),
            LOGOUT_PATH => {
                self.logout_calls.fetch_add(1, Ordering::SeqCst);
                if *self.fail_logout.lock().unwrap() {
                    Err(TransportError::Other("backend unreachable".to_string()))
                } else {
                    Ok(HttpResponse::new(204, ""))
                }
            }
            _ => Ok(self.protected_endpoint(&request)),
        }
    }
}

pub fn test_config() -> Config {
    Config {
        renewal_timeout_secs: 1,
        ..Config::default()
    }
}

/// Client whose stored access credential is already rejected by the backend
pub fn client_with_expired_access(
    backend: &Arc<FakeBackend>,
    refresh_expires_in: i64,
) -> ApiClient {
    client_with_config(backend, test_config(), refresh_expires_in)
}

pub fn client_with_config(
    backend: &Arc<FakeBackend>,
    config: Config,
    refresh_expires_in: i64,
) -> ApiClient {
    let store = Arc::new(CredentialStore::in_memory());
    store.set_pair(CredentialPair::new(
        credential("access", -60),
        credential("refresh", refresh_expires_in),
    ));
    backend.set_valid_access(None);
    ApiClient::with_transport(&config, Arc::clone(backend) as Arc<dyn HttpTransport>, store)
}
