//! Session lifecycle against the upstream host.
//!
//! # Concurrency
//!
//! The session lives behind a `tokio::sync::RwLock`; readers see the old or
//! the new session in full, never a torn mix. A dedicated gate serializes
//! session-establishment attempts so a stampede of expired callers performs
//! one create instead of many. An atomic latch admits at most one background
//! refresh at a time; the refresh uses its own short-lived client so the
//! shared client's bearer is never mutated mid-request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use skygate_client::{BreakerConfig, RetryPolicy, XrpcClient};
use skygate_common::{AppConfig, BackupCredentials, GatewayError, Result};

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";

/// How long before expiration a background refresh is scheduled.
const REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// Booked session lifetime. Upstream tokens live roughly two hours; booking
/// one hour absorbs clock skew and keeps refreshes off the request path.
const SESSION_LIFETIME: Duration = Duration::from_secs(3600);

/// Session payload returned by createSession and refreshSession.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    refresh_jwt: String,
    #[serde(default)]
    handle: String,
    #[serde(default)]
    did: String,
}

#[derive(Debug, Clone, Default)]
struct Session {
    access_jwt: String,
    refresh_jwt: String,
    handle: String,
    did: String,
    expires_at: Option<Instant>,
}

/// Identity attributes of the current session.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub handle: String,
    pub did: String,
}

struct Inner {
    client: Arc<XrpcClient>,
    config: AppConfig,
    backups: Vec<BackupCredentials>,
    retry: RetryPolicy,
    session: RwLock<Session>,
    establish_gate: Mutex<()>,
    refreshing: AtomicBool,
    refresh_task: StdMutex<Option<JoinHandle<()>>>,
}

/// Owns the session for one upstream host and vends valid access
/// credentials on demand.
///
/// Cloning is cheap; all clones share the same session state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Creates a token manager for the configured host.
    ///
    /// `backups` are tried in order when the primary credentials fail;
    /// entries without a host inherit the primary host. Session operations
    /// use the patient auth retry policy; the shared client keeps the default
    /// client policy.
    pub fn new(config: AppConfig, backups: Vec<BackupCredentials>) -> Result<Self> {
        Self::build(
            config,
            backups,
            RetryPolicy::auth_default(),
            RetryPolicy::default(),
        )
    }

    /// Creates a token manager with one explicit retry policy for both the
    /// session operations and the shared client.
    pub fn with_retry_policy(
        config: AppConfig,
        backups: Vec<BackupCredentials>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Self::build(config, backups, retry.clone(), retry)
    }

    fn build(
        config: AppConfig,
        backups: Vec<BackupCredentials>,
        retry: RetryPolicy,
        client_retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Arc::new(XrpcClient::with_policies(
            config.host.clone(),
            client_retry,
            BreakerConfig::default(),
        )?);
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                backups,
                retry,
                session: RwLock::new(Session::default()),
                establish_gate: Mutex::new(()),
                refreshing: AtomicBool::new(false),
                refresh_task: StdMutex::new(None),
            }),
        })
    }

    /// Returns a valid access credential, establishing or refreshing the
    /// session as needed.
    ///
    /// A still-valid credential close to expiration is returned immediately
    /// while a refresh proceeds in the background. Fails only after the
    /// retry budget and every backup credential are exhausted.
    pub async fn get_token(&self) -> Result<String> {
        {
            let session = self.inner.session.read().await;
            if let Some(token) = valid_token(&session) {
                if needs_refresh(&session) {
                    self.schedule_background_refresh(&session);
                }
                return Ok(token);
            }
        }

        let _gate = self.inner.establish_gate.lock().await;

        // Another caller may have established the session while we queued.
        {
            let session = self.inner.session.read().await;
            if let Some(token) = valid_token(&session) {
                return Ok(token);
            }
        }

        let refresh_jwt = self.inner.session.read().await.refresh_jwt.clone();
        if !refresh_jwt.is_empty() {
            match self.refresh_session(&refresh_jwt).await {
                Ok(token) => return Ok(token),
                Err(err) => {
                    tracing::warn!(error = %err, "session refresh failed, creating a new session");
                }
            }
        }

        self.create_session_ladder().await
    }

    /// Returns the shared client, always carrying the current bearer.
    pub fn client(&self) -> Arc<XrpcClient> {
        Arc::clone(&self.inner.client)
    }

    /// Returns the authenticated principal identifier (DID), empty before
    /// the first successful session.
    pub async fn principal(&self) -> String {
        self.inner.session.read().await.did.clone()
    }

    /// Returns the identity attributes of the current session.
    pub async fn session_info(&self) -> SessionInfo {
        let session = self.inner.session.read().await;
        SessionInfo {
            handle: session.handle.clone(),
            did: session.did.clone(),
        }
    }

    /// Cancels any pending background refresh.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn schedule_background_refresh(&self, session: &Session) {
        if session.refresh_jwt.is_empty() {
            return;
        }
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let manager = self.clone();
        let refresh_jwt = session.refresh_jwt.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = manager.background_refresh(refresh_jwt).await {
                tracing::warn!(error = %err, "background session refresh failed");
            }
            manager.inner.refreshing.store(false, Ordering::SeqCst);
        });
        *self.inner.refresh_task.lock().unwrap() = Some(handle);
    }

    async fn background_refresh(&self, refresh_jwt: String) -> Result<()> {
        // Dedicated short-lived client: the shared client's bearer must not
        // change underneath an in-flight request's retry loop.
        let client = XrpcClient::new(self.inner.config.host.clone())?;
        let response = self
            .inner
            .retry
            .run(|| {
                let body = serde_json::json!({ "refreshJwt": &refresh_jwt });
                let client = &client;
                async move {
                    let bytes = client.post(REFRESH_SESSION, &body).await?;
                    Ok(serde_json::from_slice::<SessionResponse>(&bytes)?)
                }
            })
            .await?;
        self.install_session(response).await;
        tracing::debug!("session refreshed in background");
        Ok(())
    }

    async fn refresh_session(&self, refresh_jwt: &str) -> Result<String> {
        let client = Arc::clone(&self.inner.client);
        let response = self
            .inner
            .retry
            .run(|| {
                let body = serde_json::json!({ "refreshJwt": refresh_jwt });
                let client = &client;
                async move {
                    let bytes = client.post(REFRESH_SESSION, &body).await?;
                    Ok(serde_json::from_slice::<SessionResponse>(&bytes)?)
                }
            })
            .await?;
        let token = response.access_jwt.clone();
        self.install_session(response).await;
        Ok(token)
    }

    async fn create_session_ladder(&self) -> Result<String> {
        let identifier = self.inner.config.identifier.clone();
        let secret = self.inner.config.secret.clone();
        let mut last_err = match self
            .create_session(Arc::clone(&self.inner.client), &identifier, &secret)
            .await
        {
            Ok(token) => return Ok(token),
            Err(err) => {
                tracing::warn!(error = %err, "primary credentials failed");
                err
            }
        };

        for backup in &self.inner.backups {
            let client = match backup.host.as_deref() {
                Some(host) if host != self.inner.config.host => match XrpcClient::new(host) {
                    Ok(client) => Arc::new(client),
                    Err(err) => {
                        last_err = err;
                        continue;
                    }
                },
                _ => Arc::clone(&self.inner.client),
            };
            match self
                .create_session(client, &backup.identifier, &backup.secret)
                .await
            {
                Ok(token) => {
                    tracing::info!(identifier = %backup.identifier, "authenticated with backup credentials");
                    return Ok(token);
                }
                Err(err) => last_err = err,
            }
        }

        Err(last_err)
    }

    async fn create_session(
        &self,
        client: Arc<XrpcClient>,
        identifier: &str,
        secret: &str,
    ) -> Result<String> {
        if identifier.is_empty() || secret.is_empty() {
            return Err(GatewayError::MissingCredentials);
        }

        let response = self
            .inner
            .retry
            .run(|| {
                let body = serde_json::json!({ "identifier": identifier, "password": secret });
                let client = &client;
                async move {
                    let bytes = client.post(CREATE_SESSION, &body).await?;
                    Ok(serde_json::from_slice::<SessionResponse>(&bytes)?)
                }
            })
            .await
            .map_err(|err| match err {
                GatewayError::Api {
                    status: 400 | 401 | 403,
                    message,
                } => GatewayError::Authentication(message),
                other => other,
            })?;

        let token = response.access_jwt.clone();
        self.install_session(response).await;
        Ok(token)
    }

    async fn install_session(&self, response: SessionResponse) {
        {
            let mut session = self.inner.session.write().await;
            *session = Session {
                access_jwt: response.access_jwt.clone(),
                refresh_jwt: response.refresh_jwt,
                handle: response.handle,
                did: response.did,
                expires_at: Some(Instant::now() + SESSION_LIFETIME),
            };
        }
        // Sole writer of the shared client's bearer.
        self.inner.client.set_bearer(response.access_jwt);
    }
}

fn valid_token(session: &Session) -> Option<String> {
    if session.access_jwt.is_empty() || !has_jwt_shape(&session.access_jwt) {
        return None;
    }
    match session.expires_at {
        Some(expires_at) if Instant::now() < expires_at => Some(session.access_jwt.clone()),
        _ => None,
    }
}

fn needs_refresh(session: &Session) -> bool {
    match session.expires_at {
        Some(expires_at) => {
            let now = Instant::now();
            now < expires_at && now + REFRESH_THRESHOLD > expires_at
        }
        None => false,
    }
}

/// Coarse syntactic check that a credential looks like a JWT.
fn has_jwt_shape(token: &str) -> bool {
    token.starts_with("eyJ") && token.len() >= 100
}
