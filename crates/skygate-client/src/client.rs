//! XRPC HTTP Client
//!
//! [`XrpcClient`] executes GET/POST calls against `base ⊕ "/xrpc/" ⊕
//! endpoint` under the retry policy, guarded by the circuit breaker, with an
//! endpoint-keyed fallback registry.
//!
//! # Transport
//!
//! One `reqwest` client per `XrpcClient`, built once: TLS ≥ 1.2, HTTP/2 via
//! ALPN, 20 pooled idle connections per host, 90s idle timeout, 10s total
//! per-request deadline. The bearer credential is written only by the token
//! manager; requests read an atomic snapshot of it.
//!
//! # Failure semantics
//!
//! Retries are invisible to the caller beyond latency. While the breaker is
//! open, calls do not dial: they return the registered fallback bytes if
//! present, else [`GatewayError::CircuitOpen`]. After the retry budget is
//! exhausted the fallback is consulted once before the final error surfaces.
//! Fallback-served bytes are indistinguishable from success.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::Serialize;
use skygate_common::{GatewayError, Result};

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::retry::RetryPolicy;

const POOL_IDLE_PER_HOST: usize = 20;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the upstream XRPC API.
pub struct XrpcClient {
    base_url: String,
    http: reqwest::Client,
    bearer: RwLock<Option<String>>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    fallbacks: RwLock<HashMap<String, Vec<u8>>>,
}

impl XrpcClient {
    /// Creates a client with default retry and breaker settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_policies(base_url, RetryPolicy::default(), BreakerConfig::default())
    }

    /// Creates a client with explicit retry and breaker configuration.
    pub fn with_policies(
        base_url: impl Into<String>,
        retry: RetryPolicy,
        breaker: BreakerConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .pool_max_idle_per_host(POOL_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            bearer: RwLock::new(None),
            retry,
            breaker: CircuitBreaker::new(breaker),
            fallbacks: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Installs the bearer credential used by subsequent calls.
    ///
    /// The token manager is the sole writer; readers see the old or the new
    /// credential in full, never a torn value.
    pub fn set_bearer(&self, token: impl Into<String>) {
        *self.bearer.write().unwrap() = Some(token.into());
    }

    /// Returns the currently installed bearer credential, if any.
    pub fn bearer(&self) -> Option<String> {
        self.bearer.read().unwrap().clone()
    }

    /// Returns the breaker guarding this client.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Registers a static fallback payload for an endpoint.
    ///
    /// The payload is returned verbatim when the breaker is open for this
    /// client or when all retries against the endpoint are exhausted.
    pub fn register_fallback(&self, endpoint: impl Into<String>, payload: Vec<u8>) {
        self.fallbacks.write().unwrap().insert(endpoint.into(), payload);
    }

    /// Returns whether `body` is the registered fallback payload for
    /// `endpoint`.
    ///
    /// Fallback-served bytes are otherwise indistinguishable from a real
    /// response; callers that must not present fallback data as fresh can
    /// check here.
    pub fn was_fallback(&self, endpoint: &str, body: &[u8]) -> bool {
        self.fallbacks
            .read()
            .unwrap()
            .get(endpoint)
            .is_some_and(|payload| payload.as_slice() == body)
    }

    /// Performs a GET against the endpoint with URL-encoded query pairs.
    pub async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let url = self.endpoint_url(endpoint);
        self.execute(endpoint, || {
            let mut request = self.http.get(&url);
            if !query.is_empty() {
                request = request.query(query);
            }
            request
        })
        .await
    }

    /// Performs a POST against the endpoint with a JSON body.
    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Vec<u8>> {
        let url = self.endpoint_url(endpoint);
        self.execute(endpoint, || self.http.post(&url).json(body)).await
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, endpoint)
    }

    fn bearer_snapshot(&self) -> Option<String> {
        self.bearer()
    }

    fn fallback_for(&self, endpoint: &str) -> Option<Vec<u8>> {
        self.fallbacks.read().unwrap().get(endpoint).cloned()
    }

    async fn execute<B>(&self, endpoint: &str, build: B) -> Result<Vec<u8>>
    where
        B: Fn() -> reqwest::RequestBuilder,
    {
        if !self.breaker.try_acquire() {
            if let Some(payload) = self.fallback_for(endpoint) {
                tracing::debug!(endpoint, "circuit open, serving registered fallback");
                return Ok(payload);
            }
            return Err(GatewayError::CircuitOpen);
        }

        let breaker = &self.breaker;
        let result = self
            .retry
            .run(|| {
                let request = build();
                let bearer = self.bearer_snapshot();
                async move {
                    let request = match &bearer {
                        Some(token) => request.bearer_auth(token),
                        None => request,
                    };
                    match send(request).await {
                        Ok(body) => {
                            breaker.record_success();
                            Ok(body)
                        }
                        Err(err) => {
                            breaker.record_failure();
                            Err(err)
                        }
                    }
                }
            })
            .await;

        match result {
            Ok(body) => Ok(body),
            Err(err) => match self.fallback_for(endpoint) {
                Some(payload) => {
                    tracing::warn!(endpoint, error = %err, "retries exhausted, serving fallback");
                    Ok(payload)
                }
                None => Err(err),
            },
        }
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Vec<u8>> {
    let response = request.send().await.map_err(GatewayError::from)?;
    let status = response.status();
    let body = response.bytes().await.map_err(GatewayError::from)?;

    if !status.is_success() {
        // Upstream error payloads carry {error, message}; keep the message
        // for operators, never the raw body.
        let message = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "upstream rejected the request".into());
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(body.to_vec())
}
