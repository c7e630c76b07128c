//! OAuth2 token acquisition with single-flight refresh
//!
//! The provider caches one [`AccessToken`]. When the token is missing or about
//! to expire, the first caller installs a shared exchange future and every
//! concurrent caller awaits that same future. The state lock is only held
//! while inspecting or swapping the cached values, never across the network
//! call.

use crate::config::ApiConfig;
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Token lifetime assumed when the endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Upper bound on a reported token lifetime (one year)
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 3600;

/// Long-lived credentials exchanged for bearer tokens
#[derive(Clone)]
pub struct Credentials {
    personal_access_token: String,
    client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Create credentials from a personal access token and OAuth client pair
    pub fn new(
        personal_access_token: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            personal_access_token: personal_access_token.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// The OAuth client id (not secret)
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("personal_access_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A short-lived bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token that expires at the given instant
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The raw bearer token
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token stops being accepted
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True if the token expires within `margin` of `now`
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        let margin =
            chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::weeks(52));
        match now.checked_add_signed(margin) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

type Exchange = Shared<BoxFuture<'static, Result<AccessToken, AuthError>>>;

#[derive(Default)]
struct TokenState {
    token: Option<AccessToken>,
    in_flight: Option<(u64, Exchange)>,
    generation: u64,
}

/// Exchanges [`Credentials`] for bearer tokens and caches the result
pub struct TokenProvider {
    http: reqwest::Client,
    endpoint: String,
    scope: String,
    credentials: Arc<Credentials>,
    refresh_margin: Duration,
    state: Arc<Mutex<TokenState>>,
}

impl TokenProvider {
    /// Create a provider for the token endpoint named in `config`
    pub fn new(http: reqwest::Client, config: &ApiConfig, credentials: Credentials) -> Self {
        Self {
            http,
            endpoint: config.identity_url.clone(),
            scope: config.scope.clone(),
            credentials: Arc::new(credentials),
            refresh_margin: config.token_refresh_margin,
            state: Arc::new(Mutex::new(TokenState::default())),
        }
    }

    /// Return a valid token, exchanging credentials if the cached one is
    /// missing or expires within the refresh margin.
    pub async fn get_token(&self) -> Result<AccessToken, AuthError> {
        let exchange = {
            let mut state = lock(&self.state);
            if let Some(token) = &state.token
                && !token.expires_within(self.refresh_margin, Utc::now())
            {
                return Ok(token.clone());
            }
            let pending = state.in_flight.as_ref().map(|(_, exchange)| exchange.clone());
            match pending {
                Some(exchange) => exchange,
                None => {
                    state.generation += 1;
                    let exchange = self.start_exchange(state.generation);
                    state.in_flight = Some((state.generation, exchange.clone()));
                    exchange
                }
            }
        };

        exchange.await
    }

    /// Drop the cached token if it is still `stale`
    ///
    /// A token that was already replaced by a concurrent refresh is left alone,
    /// so many callers rejecting the same token cause a single exchange.
    pub fn invalidate(&self, stale: &AccessToken) {
        let mut state = lock(&self.state);
        if state.token.as_ref() == Some(stale) {
            tracing::debug!("Invalidating rejected access token");
            state.token = None;
        }
    }

    fn start_exchange(&self, generation: u64) -> Exchange {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let scope = self.scope.clone();
        let credentials = Arc::clone(&self.credentials);
        let state = Arc::clone(&self.state);

        async move {
            let result = exchange_token(&http, &endpoint, &scope, &credentials).await;

            let mut guard = lock(&state);
            if matches!(&guard.in_flight, Some((g, _)) if *g == generation) {
                guard.in_flight = None;
                if let Ok(token) = &result {
                    guard.token = Some(token.clone());
                }
            }
            result
        }
        .boxed()
        .shared()
    }
}

fn lock(state: &Mutex<TokenState>) -> MutexGuard<'_, TokenState> {
    // Poisoned state is still consistent plain data
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

async fn exchange_token(
    http: &reqwest::Client,
    endpoint: &str,
    scope: &str,
    credentials: &Credentials,
) -> Result<AccessToken, AuthError> {
    tracing::info!(client_id = %credentials.client_id, "Exchanging personal access token");

    let form = [
        ("token", credentials.personal_access_token.as_str()),
        ("grant_type", "personal_access_token"),
        ("scope", scope),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    let response = http
        .post(endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| AuthError::new(format!("token endpoint unreachable: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::with_status(
            status.as_u16(),
            format!("token endpoint returned {status}: {}", excerpt(&body)),
        ));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::new(format!("malformed token response: {e}")))?;

    let value = body
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::new("access_token missing from token response"))?;
    let lifetime = body
        .expires_in
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
        .clamp(0, MAX_TOKEN_LIFETIME_SECS);
    let expires_at = Utc::now() + chrono::Duration::seconds(lifetime);

    tracing::debug!(expires_at = %expires_at, "Access token obtained");
    Ok(AccessToken::new(value, expires_at))
}

pub(crate) fn excerpt(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    body[..end].trim()
}
