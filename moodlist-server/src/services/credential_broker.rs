//! Credential broker for the catalog provider
//!
//! Owns the process-wide access token. A token is obtained with the OAuth
//! client-credentials grant on first use and replaced transparently once it
//! expires.
//!
//! # Single-flight refresh
//! At most one exchange is in flight at any time. The first caller that finds
//! the slot empty or expired starts the exchange and parks a shared future in
//! the slot; every caller arriving while it runs awaits that same future and
//! receives the same token (or the same failure).

use futures::future::{BoxFuture, FutureExt, Shared};
use moodlist_common::config::ClientCredentials;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Credential exchange failures
///
/// `Clone` so a single refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Network error during token exchange: {0}")]
    Network(String),

    #[error("Token exchange rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Bearer token with its issue time and declared lifetime
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    issued_at: Instant,
    expires_in: Duration,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, issued_at: Instant, expires_in: Duration) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_in,
        }
    }

    /// Raw token for the `Authorization: Bearer` header
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    /// Instant after which the token must no longer be handed out
    ///
    /// `None` when the declared lifetime runs past what `Instant` can hold;
    /// such a token never expires for this process.
    pub fn usable_until(&self, leeway: Duration) -> Option<Instant> {
        self.issued_at.checked_add(self.expires_in.saturating_sub(leeway))
    }

    /// Whether the token may still be returned at `now`
    pub fn is_usable_at(&self, now: Instant, leeway: Duration) -> bool {
        self.usable_until(leeway).map_or(true, |until| now < until)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken, AuthError>>>;

enum TokenSlot {
    Empty,
    Ready(AccessToken),
    Refreshing { flight: u64, future: RefreshFuture },
}

/// Owner of the shared access token
pub struct CredentialBroker {
    http_client: reqwest::Client,
    token_url: String,
    credentials: ClientCredentials,
    leeway: Duration,
    slot: Mutex<TokenSlot>,
    next_flight: AtomicU64,
    exchanges: Arc<AtomicU64>,
}

impl CredentialBroker {
    pub fn new(
        http_client: reqwest::Client,
        token_url: impl Into<String>,
        credentials: ClientCredentials,
        leeway: Duration,
    ) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            credentials,
            leeway,
            slot: Mutex::new(TokenSlot::Empty),
            next_flight: AtomicU64::new(1),
            exchanges: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a token that is valid right now
    ///
    /// Performs zero network calls while a usable token is held. Otherwise
    /// joins the in-flight exchange or starts one.
    pub async fn get_token(&self) -> Result<AccessToken, AuthError> {
        let (flight, future) = {
            let mut slot = self.lock_slot();

            if let TokenSlot::Ready(token) = &*slot {
                if token.is_usable_at(Instant::now(), self.leeway) {
                    return Ok(token.clone());
                }
                debug!("Held access token expired, refreshing");
            }

            if let TokenSlot::Refreshing { flight, future } = &*slot {
                debug!(flight, "Joining in-flight token exchange");
                (*flight, future.clone())
            } else {
                let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let future = self.start_exchange(flight);
                *slot = TokenSlot::Refreshing {
                    flight,
                    future: future.clone(),
                };
                (flight, future)
            }
        };

        let result = future.await;
        self.settle(flight, &result);
        result
    }

    /// Drop the held token so the next caller exchanges a fresh one
    ///
    /// An exchange already in flight is left alone.
    pub fn invalidate(&self) {
        let mut slot = self.lock_slot();
        if matches!(&*slot, TokenSlot::Ready(_)) {
            *slot = TokenSlot::Empty;
            debug!("Held access token invalidated");
        }
    }

    /// Whether a non-expired token is currently held
    pub fn has_usable_token(&self) -> bool {
        match &*self.lock_slot() {
            TokenSlot::Ready(token) => token.is_usable_at(Instant::now(), self.leeway),
            _ => false,
        }
    }

    /// Number of exchanges issued since construction
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    fn lock_slot(&self) -> MutexGuard<'_, TokenSlot> {
        // Slot is only ever replaced wholesale, so a poisoned value is still consistent
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_exchange(&self, flight: u64) -> RefreshFuture {
        let http_client = self.http_client.clone();
        let token_url = self.token_url.clone();
        let credentials = self.credentials.clone();
        let exchanges = Arc::clone(&self.exchanges);

        async move {
            exchanges.fetch_add(1, Ordering::Relaxed);
            debug!(flight, token_url = %token_url, "Exchanging client credentials");
            exchange(&http_client, &token_url, &credentials).await
        }
        .boxed()
        .shared()
    }

    /// Record the outcome of `flight` unless a newer state replaced it
    fn settle(&self, flight: u64, result: &Result<AccessToken, AuthError>) {
        let mut slot = self.lock_slot();
        let current = matches!(&*slot, TokenSlot::Refreshing { flight: f, .. } if *f == flight);
        if !current {
            return;
        }

        *slot = match result {
            Ok(token) => {
                info!(
                    flight,
                    expires_in_secs = token.expires_in().as_secs(),
                    "Access token fetched successfully"
                );
                TokenSlot::Ready(token.clone())
            }
            Err(e) => {
                warn!(flight, error = %e, "Access token exchange failed");
                TokenSlot::Empty
            }
        };
    }
}

/// Perform one client-credentials exchange
async fn exchange(
    http_client: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
) -> Result<AccessToken, AuthError> {
    let response = http_client
        .post(token_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(|e| AuthError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let issued_at = Instant::now();
    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

    if token.access_token.trim().is_empty() {
        return Err(AuthError::InvalidResponse("empty access_token".to_string()));
    }
    if let Some(token_type) = &token.token_type {
        if !token_type.eq_ignore_ascii_case("bearer") {
            warn!(token_type = %token_type, "Unexpected token type from identity provider");
        }
    }

    Ok(AccessToken::new(
        token.access_token,
        issued_at,
        Duration::from_secs(token.expires_in),
    ))
}
