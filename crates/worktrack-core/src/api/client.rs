//! Authenticated API client.
//!
//! Every call goes through [`ApiClient::request`], which attaches the current
//! access credential and recovers from a single 401 by renewing through the
//! shared [`RefreshCoordinator`] and replaying the request once.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::coordinator::RefreshCoordinator;
use super::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
use super::ApiError;
use crate::auth::{claims, Claims, CredentialPair, CredentialStore};
use crate::config::Config;

/// Shortest sleep between background renewals, so a credential whose
/// lifetime is shorter than the skew cannot cause a tight renewal loop.
const MIN_BACKGROUND_RENEWAL_SECS: u64 = 5;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignupRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "displayName")]
    display_name: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

/// Auth endpoint paths taken from [`Config`]
#[derive(Debug, Clone)]
struct Endpoints {
    login: String,
    signup: String,
    logout: String,
}

/// API client for the worktrack backend.
/// Clone is cheap - transport, store and coordinator are shared via Arc.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    endpoints: Endpoints,
    expiry_skew_secs: i64,
    preemptive_renewal: bool,
}

impl ApiClient {
    /// Create a client talking to `config.api_base_url` over HTTP
    pub fn new(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout())?;
        Ok(Self::with_transport(
            config,
            Arc::new(transport),
            Arc::new(CredentialStore::in_memory()),
        ))
    }

    /// Create a client over an arbitrary transport and credential store
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            config.refresh_path.clone(),
            config.renewal_timeout(),
        ));
        Self {
            transport,
            store,
            coordinator,
            endpoints: Endpoints {
                login: config.login_path.clone(),
                signup: config.signup_path.clone(),
                logout: config.logout_path.clone(),
            },
            expiry_skew_secs: config.expiry_skew_secs,
            preemptive_renewal: config.preemptive_renewal,
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn is_logged_in(&self) -> bool {
        self.store.is_logged_in()
    }

    /// Claims of the signed-in user, for display only
    pub fn current_user(&self) -> Option<Claims> {
        self.store.claims()
    }

    // ===== Session Lifecycle =====

    /// Sign in and start a new session
    pub async fn login(&self, email: &str, password: &str) -> Result<Claims, ApiError> {
        let body = serde_json::to_value(LoginRequest { email, password })
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.authenticate(&self.endpoints.login, body).await
    }

    /// Create an account and start a session for it
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Claims, ApiError> {
        let body = serde_json::to_value(SignupRequest {
            email,
            password,
            display_name,
        })
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.authenticate(&self.endpoints.signup, body).await
    }

    async fn authenticate(&self, path: &str, body: Value) -> Result<Claims, ApiError> {
        let response = self
            .transport
            .send(HttpRequest::post(path, body))
            .await?
            .error_for_status()?;

        let auth: AuthResponse = response.json()?;
        let user = claims::decode(&auth.access_token).ok_or_else(|| {
            ApiError::InvalidResponse("Malformed access credential in auth response".to_string())
        })?;
        if claims::decode(&auth.refresh_token).is_none() {
            return Err(ApiError::InvalidResponse(
                "Malformed refresh credential in auth response".to_string(),
            ));
        }

        self.store
            .set_pair(CredentialPair::new(auth.access_token, auth.refresh_token));
        info!(subject = %user.subject_id, "Signed in");
        Ok(user)
    }

    /// End the session. The server-side invalidation is best effort; the
    /// local credentials are cleared whatever happens to it.
    pub async fn logout(&self) {
        if let Some(pair) = self.store.pair() {
            let request = HttpRequest::post(
                &self.endpoints.logout,
                json!({ "refreshToken": pair.refresh }),
            )
            .with_bearer(Some(pair.access));

            match self.transport.send(request).await {
                Ok(response) if response.is_success() => debug!("Server session invalidated"),
                Ok(response) => warn!(status = response.status, "Logout rejected by server"),
                Err(e) => warn!(error = %e, "Logout request failed"),
            }
        }
        self.store.clear();
        info!("Signed out");
    }

    // ===== Request Pipeline =====

    /// Send a request with the current access credential attached.
    ///
    /// A 401 triggers at most one renewal (shared with any concurrent callers)
    /// followed by exactly one replay; whatever the replay returns is the
    /// result. Non-401 statuses are returned untouched.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<HttpResponse, ApiError> {
        let mut access = self.store.access();

        if self.preemptive_renewal {
            if let Some(current) = access.as_deref() {
                if claims::is_expired(current, self.expiry_skew_secs) {
                    let Some(refresh) = self.store.refresh() else {
                        return Err(self.end_session(None));
                    };
                    debug!(path = %path, "Access credential inside expiry window, renewing first");
                    access = match self.coordinator.renew(Some(current)).await {
                        Some(renewed) => Some(renewed),
                        None => return Err(self.end_session(Some(&refresh))),
                    };
                }
            }
        }

        let response = self
            .send(method.clone(), path, body.clone(), access.clone())
            .await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        let Some(refresh) = self.store.refresh() else {
            warn!(path = %path, "Unauthorized with no refresh credential");
            return Err(self.end_session(None));
        };

        match self.coordinator.renew(access.as_deref()).await {
            Some(renewed) => {
                debug!(path = %path, "Replaying request with renewed credential");
                self.send(method, path, body, Some(renewed)).await
            }
            None => Err(self.end_session(Some(&refresh))),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        bearer: Option<String>,
    ) -> Result<HttpResponse, ApiError> {
        debug!(method = %method, path = %path, authenticated = bearer.is_some(), "Sending request");
        let request = HttpRequest::new(method, path)
            .with_bearer(bearer)
            .with_body(body);
        let response = self.transport.send(request).await?;
        debug!(path = %path, status = response.status, "Response received");
        Ok(response)
    }

    /// Clear the session the caller was working with and report it expired
    fn end_session(&self, refresh: Option<&str>) -> ApiError {
        match refresh {
            Some(refresh) => {
                self.store.clear_if(refresh);
            }
            None => self.store.clear(),
        }
        ApiError::SessionExpired
    }

    /// GET a JSON resource
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None)
            .await?
            .error_for_status()?
            .json()
    }

    /// POST a JSON body and parse the JSON reply
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode body: {}", e)))?;
        self.request(Method::POST, path, Some(body))
            .await?
            .error_for_status()?
            .json()
    }

    // ===== Background Renewal =====

    /// Spawn a task that renews the access credential shortly before it
    /// expires. The task ends when the session ends or renewal fails.
    pub fn spawn_background_renewal(&self) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                let Some(access) = client.store.access() else {
                    debug!("No session, background renewal stopping");
                    break;
                };

                let lead =
                    claims::time_until_expiry(&access).saturating_sub(client.expiry_skew_secs);
                let wait = u64::try_from(lead)
                    .unwrap_or(0)
                    .max(MIN_BACKGROUND_RENEWAL_SECS);
                tokio::time::sleep(Duration::from_secs(wait)).await;

                if client.store.access().as_deref() != Some(access.as_str()) {
                    // Renewed or replaced meanwhile; re-evaluate
                    continue;
                }
                if client.store.refresh().is_none() {
                    break;
                }
                if client.coordinator.renew(Some(&access)).await.is_none() {
                    warn!("Background renewal failed, session ended");
                    break;
                }
            }
        })
    }
}
